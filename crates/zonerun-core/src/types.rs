//! Core types for the task agent.
//!
//! The manifest is read permissively: the agent only interprets `zones`, `tasks`,
//! `command` and `status`. Everything else is carried through untouched so the
//! annotated manifest posted back has the same shape as the one that was loaded.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::ops::{Deref, DerefMut};

/// Run-scoped group identifier.
///
/// Sent verbatim as the `group_id` query parameter; zero-padded to two digits when
/// substituted into command templates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier left-padded with zeros to width 2 (`"5"` becomes `"05"`).
    ///
    /// A leading sign stays in front of the padding and longer values are never
    /// truncated.
    pub fn padded(&self) -> String {
        zero_pad(&self.0, 2)
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for GroupId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn zero_pad(value: &str, width: usize) -> String {
    let len = value.chars().count();
    if len >= width {
        return value.to_string();
    }
    let fill = "0".repeat(width - len);
    match value.chars().next() {
        Some(sign @ ('+' | '-')) => format!("{sign}{fill}{}", &value[1..]),
        _ => format!("{fill}{value}"),
    }
}

// --- Status vocabulary ---

/// Normalized outcome of one task.
///
/// `Pending` covers both "ran and exited non-zero" and "had nothing to run". The
/// remote side cannot tell the two apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    Pending,
    Timeout,
    Error,
}

impl Status {
    pub const ALL: [Status; 4] = [Self::Ok, Self::Pending, Self::Timeout, Self::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Pending => "Pending",
            Self::Timeout => "Timeout",
            Self::Error => "Error",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-status task tally for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    #[serde(rename = "OK")]
    pub ok: u64,
    #[serde(rename = "Pending")]
    pub pending: u64,
    #[serde(rename = "Timeout")]
    pub timeout: u64,
    #[serde(rename = "Error")]
    pub error: u64,
}

impl StatusCounts {
    /// Count one processed task.
    pub fn record(&mut self, status: Status) {
        match status {
            Status::Ok => self.ok += 1,
            Status::Pending => self.pending += 1,
            Status::Timeout => self.timeout += 1,
            Status::Error => self.error += 1,
        }
    }

    pub fn get(&self, status: Status) -> u64 {
        match status {
            Status::Ok => self.ok,
            Status::Pending => self.pending,
            Status::Timeout => self.timeout,
            Status::Error => self.error,
        }
    }

    pub fn total(&self) -> u64 {
        self.ok + self.pending + self.timeout + self.error
    }
}

// --- Manifest ---

/// Root of a task manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Missing or `null` reads as no zones, and is written back the same way.
    #[serde(default, skip_serializing_if = "ListField::is_absent")]
    pub zones: ListField<Zone>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Manifest {
    /// Total number of tasks across all zones.
    pub fn task_count(&self) -> usize {
        self.zones.iter().map(|zone| zone.tasks.len()).sum()
    }
}

/// Named grouping of tasks. The grouping key lives in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    #[serde(default, skip_serializing_if = "ListField::is_absent")]
    pub tasks: ListField<Task>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One unit of work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Outer `None` when the key is absent, `Some(None)` for an explicit `null`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub command: Option<Option<String>>,
    /// Written by the batch executor. Unrecognized input values read as `None`.
    #[serde(
        default,
        deserialize_with = "lenient_status",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<Status>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: Some(Some(command.into())),
            ..Self::default()
        }
    }

    /// The command to run, if there is a non-empty one.
    pub fn runnable_command(&self) -> Option<&str> {
        self.command
            .as_ref()
            .and_then(Option::as_deref)
            .filter(|cmd| !cmd.is_empty())
    }
}

/// A manifest list that remembers how it appeared in the input.
///
/// Reads as a slice in every case; an absent or `null` list is empty. On output an
/// absent list is skipped and a `null` one is written as `null`.
#[derive(Debug, Clone, PartialEq)]
pub enum ListField<T> {
    Absent,
    Null,
    Items(Vec<T>),
}

impl<T> ListField<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl<T> Default for ListField<T> {
    fn default() -> Self {
        Self::Absent
    }
}

impl<T> From<Vec<T>> for ListField<T> {
    fn from(items: Vec<T>) -> Self {
        Self::Items(items)
    }
}

impl<T> Deref for ListField<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match self {
            Self::Items(items) => items,
            Self::Absent | Self::Null => &[],
        }
    }
}

impl<T> DerefMut for ListField<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        match self {
            Self::Items(items) => items,
            Self::Absent | Self::Null => &mut [],
        }
    }
}

impl<'a, T> IntoIterator for &'a ListField<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T> IntoIterator for &'a mut ListField<T> {
    type Item = &'a mut T;
    type IntoIter = std::slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<T: Serialize> Serialize for ListField<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Items(items) => items.serialize(serializer),
            Self::Absent | Self::Null => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for ListField<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<Vec<T>>::deserialize(deserializer)? {
            Some(items) => Self::Items(items),
            None => Self::Null,
        })
    }
}

/// Only called when the key is present, so `null` survives as `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn lenient_status<'de, D>(deserializer: D) -> Result<Option<Status>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// Outcome of one processed task, emitted in manifest order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRecord {
    /// Zero-based zone position.
    pub zone: usize,
    /// Zero-based task position within the zone.
    pub task: usize,
    /// Command after placeholder substitution; `None` when nothing was run.
    pub command: Option<String>,
    pub status: Status,
    pub duration_ms: u64,
}
