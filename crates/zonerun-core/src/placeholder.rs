//! Placeholder substitution for command templates.
//!
//! Tokens are replaced literally. Nothing is quoted or escaped: the resolved
//! string goes straight to the shell, so the manifest must be trusted.

use crate::types::GroupId;

/// Token bound to `grup<NN>` for the run's group.
pub const GROUP_TOKEN: &str = "%GRUP%";

/// Run-scoped token table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitutions {
    entries: Vec<(String, String)>,
}

impl Substitutions {
    /// Table with only the group token bound.
    pub fn for_group(group_id: &GroupId) -> Self {
        let mut table = Self::default();
        table.insert(GROUP_TOKEN, format!("grup{}", group_id.padded()));
        table
    }

    /// Group token plus static tokens (user name, home directory, ...).
    pub fn with_tokens<'a, I>(group_id: &GroupId, tokens: I) -> Self
    where
        I: IntoIterator<Item = &'a (String, String)>,
    {
        let mut table = Self::for_group(group_id);
        for (token, value) in tokens {
            table.insert(token.clone(), value.clone());
        }
        table
    }

    /// Bind `token` to `value`, replacing an earlier binding of the same token.
    pub fn insert(&mut self, token: impl Into<String>, value: impl Into<String>) {
        let token = token.into();
        let value = value.into();
        if token.is_empty() {
            return;
        }
        if let Some(entry) = self.entries.iter_mut().find(|(t, _)| *t == token) {
            entry.1 = value;
        } else {
            self.entries.push((token, value));
        }
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == token)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace every occurrence of every bound token. Unbound tokens stay as-is.
    ///
    /// Single left-to-right pass over `command`: substituted values are never
    /// scanned again. Where two tokens start at the same position the longer wins.
    pub fn resolve(&self, command: &str) -> String {
        let mut resolved = String::with_capacity(command.len());
        let mut rest = command;
        while let Some((pos, token, value)) = self.next_match(rest) {
            resolved.push_str(&rest[..pos]);
            resolved.push_str(value);
            rest = &rest[pos + token.len()..];
        }
        resolved.push_str(rest);
        resolved
    }

    fn next_match(&self, haystack: &str) -> Option<(usize, &str, &str)> {
        self.entries
            .iter()
            .filter_map(|(token, value)| {
                haystack
                    .find(token.as_str())
                    .map(|pos| (pos, token.as_str(), value.as_str()))
            })
            .min_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.len().cmp(&a.1.len())))
    }
}
