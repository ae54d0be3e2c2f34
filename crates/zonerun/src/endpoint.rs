//! Endpoint normalization.
//!
//! Accepts a bare host (`example.com/api`) or a full URL and produces the URL the
//! report is posted to, with `group_id` appended to whatever query it already had.

use reqwest::Url;
use thiserror::Error;

/// Query parameter carrying the group identifier.
pub const GROUP_ID_PARAM: &str = "group_id";

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("endpoint is empty")]
    Empty,
    #[error("invalid endpoint {endpoint}: {reason}")]
    Invalid { endpoint: String, reason: String },
}

pub type Result<T> = std::result::Result<T, EndpointError>;

/// Build the report URL for `server` and `group_id`.
///
/// `https://` is prepended when no `http://` or `https://` prefix is present.
/// Path, fragment and existing query parameters are kept.
pub fn normalize(server: &str, group_id: &str) -> Result<Url> {
    let server = server.trim();
    if server.is_empty() {
        return Err(EndpointError::Empty);
    }

    let with_scheme = if has_http_scheme(server) {
        server.to_string()
    } else {
        format!("https://{server}")
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| EndpointError::Invalid {
        endpoint: server.to_string(),
        reason: e.to_string(),
    })?;
    url.query_pairs_mut().append_pair(GROUP_ID_PARAM, group_id);
    Ok(url)
}

fn has_http_scheme(server: &str) -> bool {
    ["http://", "https://"].iter().any(|prefix| {
        server
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(url: &Url) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        pairs.sort();
        pairs
    }

    #[test]
    fn bare_host_gets_https() {
        let url = normalize("example.com/api", "7").unwrap();
        assert_eq!(url.as_str(), "https://example.com/api?group_id=7");
    }

    #[test]
    fn explicit_http_is_kept() {
        let url = normalize("http://127.0.0.1:8080/report", "3").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/report?group_id=3");
    }

    #[test]
    fn scheme_check_ignores_case() {
        let url = normalize("HTTP://example.com/api", "3").unwrap();
        assert_eq!(url.scheme(), "http");
    }

    #[test]
    fn existing_query_is_preserved() {
        let url = normalize("https://example.com/api?x=1", "07").unwrap();
        assert_eq!(url.path(), "/api");
        assert_eq!(
            query(&url),
            vec![
                ("group_id".to_string(), "07".to_string()),
                ("x".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn fragment_is_preserved() {
        let url = normalize("example.com/api?x=1#top", "2").unwrap();
        assert_eq!(url.fragment(), Some("top"));
        assert_eq!(url.path(), "/api");
        assert_eq!(query(&url).len(), 2);
    }

    #[test]
    fn group_id_is_encoded() {
        let url = normalize("example.com", "a b&c").unwrap();
        assert_eq!(
            query(&url),
            vec![("group_id".to_string(), "a b&c".to_string())]
        );
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let url = normalize("  example.com/api \n", "1").unwrap();
        assert_eq!(url.as_str(), "https://example.com/api?group_id=1");
    }

    #[test]
    fn empty_endpoint_is_rejected() {
        assert!(matches!(normalize("   ", "1"), Err(EndpointError::Empty)));
    }

    #[test]
    fn unparseable_endpoint_is_rejected() {
        assert!(matches!(
            normalize("http://exa mple.com", "1"),
            Err(EndpointError::Invalid { .. })
        ));
    }
}
