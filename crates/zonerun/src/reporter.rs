//! Result reporter.
//!
//! Posts the annotated manifest to the reporting endpoint and folds every outcome
//! into a [`ReportResponse`]:
//! - server answered (any status, 4xx/5xx included): real status code and body
//! - no answer at all (DNS, refused, TLS, timeout): status code `-1` and a
//!   `{"error", "message"}` body describing the failure
//!
//! Redirects are never followed, so a POST is never silently replayed as a GET.

use crate::endpoint;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::redirect::Policy;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use zonerun_core::{GroupId, Manifest, StatusCounts};

/// Status code reported when no HTTP response was received.
pub const TRANSPORT_FAILURE: i32 = -1;

/// Default limit for the report request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

const METHOD: &str = "POST";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;

/// Outcome of the report call, as handed to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportResponse {
    pub requested_url: String,
    pub method_sent: String,
    /// HTTP status, or [`TRANSPORT_FAILURE`].
    pub status_code: i32,
    pub group_id: String,
    /// Parsed JSON when the server declared `application/json`, raw text otherwise.
    pub response_json: Value,
}

impl ReportResponse {
    /// Record for a request that never got an HTTP response.
    pub fn failure(
        requested_url: impl Into<String>,
        group_id: &GroupId,
        kind: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            requested_url: requested_url.into(),
            method_sent: METHOD.to_string(),
            status_code: TRANSPORT_FAILURE,
            group_id: group_id.to_string(),
            response_json: json!({ "error": kind, "message": message.into() }),
        }
    }

    pub fn is_transport_failure(&self) -> bool {
        self.status_code == TRANSPORT_FAILURE
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Report body: the annotated manifest, optionally with a root `counts` object.
#[derive(Debug, Serialize)]
pub struct ReportPayload<'a> {
    #[serde(flatten)]
    pub manifest: &'a Manifest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<&'a StatusCounts>,
}

/// Reporter configuration.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    pub request_timeout: Duration,
    /// Accept any server certificate. Never the default; unsafe for production.
    pub insecure: bool,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            insecure: false,
        }
    }
}

/// HTTP client for the reporting endpoint.
#[derive(Debug)]
pub struct Reporter {
    http: reqwest::Client,
}

impl Reporter {
    pub fn new(config: &ReporterConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .redirect(Policy::none());

        if config.insecure {
            warn!("TLS certificate validation is disabled; do not use this outside testing");
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            http: builder.build()?,
        })
    }

    /// Normalize `endpoint` and post `payload` to it.
    ///
    /// An endpoint that cannot be turned into a URL is reported like a transport
    /// failure, with kind `invalid_url`.
    pub async fn report<T>(&self, endpoint: &str, group_id: &GroupId, payload: &T) -> ReportResponse
    where
        T: Serialize + ?Sized,
    {
        match endpoint::normalize(endpoint, group_id.as_str()) {
            Ok(url) => self.send(&url, group_id, payload).await,
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "invalid report endpoint");
                ReportResponse::failure(endpoint, group_id, "invalid_url", e.to_string())
            }
        }
    }

    /// POST `payload` as JSON to an already normalized URL.
    pub async fn send<T>(&self, url: &Url, group_id: &GroupId, payload: &T) -> ReportResponse
    where
        T: Serialize + ?Sized,
    {
        info!(url = %url, "sending report");

        let result = self
            .http
            .post(url.clone())
            .headers(Self::headers())
            .json(payload)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let kind = transport_kind(&e);
                let message = describe(&e);
                warn!(url = %url, kind, error = %message, "report not delivered");
                return ReportResponse::failure(url.as_str(), group_id, kind, message);
            }
        };

        let status_code = i32::from(response.status().as_u16());
        let requested_url = response.url().to_string();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("application/json"));

        let response_json = match response.text().await {
            Ok(text) => parse_body(text, is_json),
            Err(e) => {
                warn!(url = %url, status_code, error = %e, "failed to read report response body");
                json!({ "error": "body", "message": describe(&e) })
            }
        };

        if (200..300).contains(&status_code) {
            info!(url = %url, status_code, "report delivered");
        } else {
            warn!(url = %url, status_code, "report rejected by server");
        }

        ReportResponse {
            requested_url,
            method_sent: METHOD.to_string(),
            status_code,
            group_id: group_id.to_string(),
            response_json,
        }
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }
}

/// JSON bodies that fail to parse fall back to raw text.
fn parse_body(text: String, is_json: bool) -> Value {
    if is_json {
        if let Ok(value) = serde_json::from_str(&text) {
            return value;
        }
    }
    Value::String(text)
}

fn transport_kind(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else if err.is_builder() || err.is_request() {
        "request"
    } else if err.is_body() || err.is_decode() {
        "body"
    } else {
        "transport"
    }
}

/// Error message followed by its source chain.
fn describe(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonerun_core::{Status, Task, Zone};

    #[test]
    fn failure_record_uses_sentinel() {
        let record = ReportResponse::failure(
            "https://example.com/?group_id=1",
            &GroupId::new("1"),
            "connect",
            "connection refused",
        );
        assert_eq!(record.status_code, TRANSPORT_FAILURE);
        assert_eq!(record.method_sent, "POST");
        assert_eq!(record.group_id, "1");
        assert!(record.is_transport_failure());
        assert!(!record.is_success());
        assert_eq!(record.response_json["error"], "connect");
        assert_eq!(record.response_json["message"], "connection refused");
    }

    #[test]
    fn parse_body_prefers_json_when_declared() {
        assert_eq!(parse_body("{\"ok\":true}".into(), true), json!({"ok": true}));
        assert_eq!(parse_body("{\"ok\":true}".into(), false), json!("{\"ok\":true}"));
        assert_eq!(parse_body("not json".into(), true), json!("not json"));
    }

    #[test]
    fn payload_flattens_manifest_and_adds_counts() {
        let mut task = Task::with_command("true");
        task.status = Some(Status::Ok);
        let mut manifest = Manifest {
            zones: vec![Zone {
                tasks: vec![task].into(),
                ..Zone::default()
            }]
            .into(),
            ..Manifest::default()
        };
        manifest.extra.insert("aula".into(), json!("A1"));
        let mut counts = StatusCounts::default();
        counts.record(Status::Ok);

        let with_counts = serde_json::to_value(ReportPayload {
            manifest: &manifest,
            counts: Some(&counts),
        })
        .unwrap();
        assert_eq!(with_counts["aula"], "A1");
        assert_eq!(with_counts["zones"][0]["tasks"][0]["status"], "OK");
        assert_eq!(with_counts["counts"]["OK"], 1);

        let without = serde_json::to_value(ReportPayload {
            manifest: &manifest,
            counts: None,
        })
        .unwrap();
        assert!(without.get("counts").is_none());
        assert_eq!(without, serde_json::to_value(&manifest).unwrap());
    }

    #[derive(Debug, Error)]
    #[error("request failed")]
    struct Wrapped(#[source] std::io::Error);

    #[test]
    fn describe_includes_source_chain() {
        let err = Wrapped(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert_eq!(describe(&err), "request failed: connection refused");
    }

    #[test]
    fn reporter_builds_in_both_tls_modes() {
        assert!(Reporter::new(&ReporterConfig::default()).is_ok());
        assert!(Reporter::new(&ReporterConfig {
            request_timeout: Duration::from_secs(1),
            insecure: true,
        })
        .is_ok());
    }

    #[tokio::test]
    async fn invalid_endpoint_is_reported_not_raised() {
        let reporter = Reporter::new(&ReporterConfig::default()).unwrap();
        let response = reporter
            .report("http://exa mple.com", &GroupId::new("2"), &json!({}))
            .await;
        assert_eq!(response.status_code, TRANSPORT_FAILURE);
        assert_eq!(response.requested_url, "http://exa mple.com");
        assert_eq!(response.response_json["error"], "invalid_url");
    }
}
