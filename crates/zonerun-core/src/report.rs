//! TSV results log.
//!
//! One row per processed task, appended across runs so a scheduled agent builds up
//! a plain-text history next to whatever the endpoint keeps.
//!
//! Columns: `timestamp_ms`, `group_id`, zone, task, status, `duration_ms`, command

use crate::types::{GroupId, TaskRecord};
use chrono::Utc;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A single row in the results log.
#[derive(Debug, Clone)]
pub struct ResultRow {
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: i64,
    pub group_id: String,
    pub zone: usize,
    pub task: usize,
    pub status: String,
    pub duration_ms: u64,
    /// Resolved command, empty when nothing was run.
    pub command: String,
}

impl ResultRow {
    pub fn new(timestamp_ms: i64, group_id: &GroupId, record: &TaskRecord) -> Self {
        Self {
            timestamp_ms,
            group_id: group_id.to_string(),
            zone: record.zone,
            task: record.task,
            status: record.status.to_string(),
            duration_ms: record.duration_ms,
            command: record.command.clone().unwrap_or_default(),
        }
    }

    /// Row stamped with the current time.
    pub fn now(group_id: &GroupId, record: &TaskRecord) -> Self {
        Self::new(Utc::now().timestamp_millis(), group_id, record)
    }

    /// Format as a TSV line.
    fn to_tsv_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.timestamp_ms,
            sanitize_field(&self.group_id),
            self.zone,
            self.task,
            self.status,
            self.duration_ms,
            sanitize_field(&self.command),
        )
    }
}

/// Sanitize a field value to prevent TSV breakage.
fn sanitize_field(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

/// TSV header row.
const HEADER: &str = "timestamp_ms\tgroup_id\tzone\ttask\tstatus\tduration_ms\tcommand";

/// Appending writer for the results log.
pub struct ResultsWriter {
    writer: BufWriter<File>,
}

impl std::fmt::Debug for ResultsWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultsWriter")
            .field("writer", &"BufWriter<File>")
            .finish()
    }
}

impl ResultsWriter {
    /// Open for appending, writing the header if the file is new.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        let exists = path.exists();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);

        if !exists {
            writeln!(writer, "{HEADER}")?;
        }

        Ok(Self { writer })
    }

    pub fn write_row(&mut self, row: &ResultRow) -> std::io::Result<()> {
        writeln!(self.writer, "{}", row.to_tsv_line())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// Append rows for every record of one run.
pub fn append_records(
    path: &Path,
    group_id: &GroupId,
    records: &[TaskRecord],
) -> std::io::Result<()> {
    let mut writer = ResultsWriter::new(path)?;
    for record in records {
        writer.write_row(&ResultRow::now(group_id, record))?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Status;
    use tempfile::TempDir;

    fn record(zone: usize, task: usize, command: Option<&str>, status: Status) -> TaskRecord {
        TaskRecord {
            zone,
            task,
            command: command.map(String::from),
            status,
            duration_ms: 12,
        }
    }

    #[test]
    fn result_row_to_tsv_line() {
        let row = ResultRow::new(
            1769687293854,
            &GroupId::new("7"),
            &record(1, 2, Some("ping -c1 grup07"), Status::Ok),
        );
        assert_eq!(
            row.to_tsv_line(),
            "1769687293854\t7\t1\t2\tOK\t12\tping -c1 grup07"
        );
    }

    #[test]
    fn result_row_without_command_has_empty_field() {
        let row = ResultRow::new(1, &GroupId::new("7"), &record(0, 0, None, Status::Pending));
        assert!(row.to_tsv_line().ends_with("\tPending\t12\t"));
    }

    #[test]
    fn sanitize_field_removes_control_chars() {
        let sanitized = sanitize_field("line1\nline2\twith\rcr");
        assert!(!sanitized.contains('\t'));
        assert!(!sanitized.contains('\n'));
        assert!(!sanitized.contains('\r'));
    }

    #[test]
    fn results_writer_appends_without_duplicate_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("results.tsv");
        let group = GroupId::new("3");

        append_records(&path, &group, &[record(0, 0, Some("true"), Status::Ok)]).unwrap();
        append_records(
            &path,
            &group,
            &[
                record(0, 0, Some("false"), Status::Pending),
                record(1, 0, Some("sleep 9"), Status::Timeout),
            ],
        )
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], HEADER);
        assert!(lines[1].contains("\tOK\t"));
        assert!(lines[2].contains("\tPending\t"));
        assert!(lines[3].contains("\tTimeout\t"));
    }

    #[test]
    fn appended_rows_are_stamped_with_current_time() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.tsv");

        let before = Utc::now().timestamp_millis();
        append_records(
            &path,
            &GroupId::new("3"),
            &[record(0, 0, Some("true"), Status::Ok)],
        )
        .unwrap();
        let after = Utc::now().timestamp_millis();

        let content = std::fs::read_to_string(&path).unwrap();
        let row = content.lines().nth(1).unwrap();
        let stamp: i64 = row.split('\t').next().unwrap().parse().unwrap();
        assert!((before..=after).contains(&stamp));
        assert!(row.ends_with("\t3\t0\t0\tOK\t12\ttrue"));
    }
}
