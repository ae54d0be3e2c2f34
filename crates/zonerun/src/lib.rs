//! zonerun - scheduled task agent
//!
//! Runs every command of a zone/task manifest in order, writes a status into each
//! task, and posts the annotated manifest to a reporting endpoint. Nothing here
//! prints; callers get structured results back and decide how to render them.

pub mod batch;
pub mod endpoint;
pub mod executor;
pub mod reporter;

use std::path::PathBuf;
use std::time::Duration;

use batch::{BatchExecutor, BatchOutcome};
use executor::{CommandRunner, ProcessExecutor, ShellExecutor};
use reporter::{ReportError, ReportPayload, ReportResponse, Reporter, ReporterConfig};
use thiserror::Error;
use tracing::info;
use zonerun_core::{Config, GroupId, Manifest, StatusCounts, TaskRecord};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Report(#[from] ReportError),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Settings for one agent run.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Per-command limit, the same for every task in the run.
    pub command_timeout: Duration,
    pub request_timeout: Duration,
    /// Disable TLS certificate validation. Opt-in only.
    pub insecure: bool,
    /// Add status counts to the report body.
    pub include_counts: bool,
    pub shell: PathBuf,
    /// Static placeholder tokens.
    pub tokens: Vec<(String, String)>,
}

impl AgentConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            command_timeout: config.command_timeout(),
            request_timeout: config.request_timeout(),
            insecure: config.insecure,
            include_counts: config.include_counts,
            shell: config.shell.clone(),
            tokens: config.tokens.clone(),
        }
    }

    fn reporter_config(&self) -> ReporterConfig {
        ReporterConfig {
            request_timeout: self.request_timeout,
            insecure: self.insecure,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Input manifest with `status` set on every task.
    pub manifest: Manifest,
    pub counts: StatusCounts,
    pub records: Vec<TaskRecord>,
    pub response: ReportResponse,
}

/// Run the manifest through the configured shell and report the results.
pub async fn run(
    manifest: Manifest,
    group_id: &GroupId,
    endpoint: &str,
    config: &AgentConfig,
) -> Result<RunOutcome> {
    let executor = ShellExecutor::new(config.shell.clone());
    run_with_executor(manifest, group_id, endpoint, config, executor).await
}

/// Same as [`run`] with an injected process executor.
///
/// Only a failure to construct the HTTP client is returned as an error. Command
/// failures end up in the task statuses and delivery failures in the response.
pub async fn run_with_executor<E: ProcessExecutor>(
    mut manifest: Manifest,
    group_id: &GroupId,
    endpoint: &str,
    config: &AgentConfig,
    executor: E,
) -> Result<RunOutcome> {
    // Client first: a broken TLS backend should stop the run before any command executes.
    let reporter = Reporter::new(&config.reporter_config())?;

    let batch = BatchExecutor::new(CommandRunner::new(executor, config.command_timeout))
        .with_tokens(config.tokens.clone());
    let BatchOutcome { counts, records } = batch.execute(&mut manifest, group_id).await;

    let payload = ReportPayload {
        manifest: &manifest,
        counts: config.include_counts.then_some(&counts),
    };
    let response = reporter.report(endpoint, group_id, &payload).await;

    info!(
        group_id = %group_id,
        status_code = response.status_code,
        tasks = counts.total(),
        "run complete"
    );

    Ok(RunOutcome {
        manifest,
        counts,
        records,
        response,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_config_from_config() {
        let mut config = Config::default();
        config.command_timeout_sec = 15;
        config.request_timeout_sec = 5;
        config.include_counts = true;
        config.set_token("%USER%", "alumne");

        let agent = AgentConfig::from_config(&config);
        assert_eq!(agent.command_timeout, Duration::from_secs(15));
        assert_eq!(agent.request_timeout, Duration::from_secs(5));
        assert!(agent.include_counts);
        assert!(!agent.insecure);
        assert_eq!(agent.tokens, vec![("%USER%".to_string(), "alumne".to_string())]);
    }

    #[test]
    fn default_agent_config_is_secure() {
        let agent = AgentConfig::default();
        assert!(!agent.insecure);
        assert_eq!(agent.request_timeout, Duration::from_secs(20));
        assert_eq!(agent.shell, PathBuf::from("/bin/sh"));
    }
}
