//! Batch executor.
//!
//! Walks zones and tasks in manifest order, one task at a time, and writes each
//! task's status back in place. Nothing is added, removed or reordered.

use crate::executor::{CommandRunner, ProcessExecutor};
use std::time::Instant;
use tracing::{debug, info};
use zonerun_core::{GroupId, Manifest, StatusCounts, Substitutions, TaskRecord};

/// Result of one batch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub counts: StatusCounts,
    /// One record per task, in manifest order.
    pub records: Vec<TaskRecord>,
}

/// Sequential executor for a whole manifest.
#[derive(Debug)]
pub struct BatchExecutor<E> {
    runner: CommandRunner<E>,
    tokens: Vec<(String, String)>,
}

impl<E: ProcessExecutor> BatchExecutor<E> {
    pub fn new(runner: CommandRunner<E>) -> Self {
        Self {
            runner,
            tokens: Vec::new(),
        }
    }

    /// Static tokens resolved in addition to the group token.
    pub fn with_tokens(mut self, tokens: Vec<(String, String)>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn runner(&self) -> &CommandRunner<E> {
        &self.runner
    }

    /// Run every task and annotate the manifest with its status.
    pub async fn execute(&self, manifest: &mut Manifest, group_id: &GroupId) -> BatchOutcome {
        let substitutions = Substitutions::with_tokens(group_id, &self.tokens);
        let mut outcome = BatchOutcome {
            counts: StatusCounts::default(),
            records: Vec::with_capacity(manifest.task_count()),
        };

        info!(
            group_id = %group_id,
            zones = manifest.zones.len(),
            tasks = manifest.task_count(),
            timeout_ms = self.runner.timeout().as_millis() as u64,
            "starting batch"
        );

        for (zone_idx, zone) in manifest.zones.iter_mut().enumerate() {
            for (task_idx, task) in zone.tasks.iter_mut().enumerate() {
                let command = task
                    .runnable_command()
                    .map(|cmd| substitutions.resolve(cmd));

                let start = Instant::now();
                let status = self.runner.run(command.as_deref()).await;
                let duration_ms = start.elapsed().as_millis() as u64;

                task.status = Some(status);
                outcome.counts.record(status);

                debug!(
                    zone = zone_idx,
                    task = task_idx,
                    status = %status,
                    duration_ms,
                    "task finished"
                );

                outcome.records.push(TaskRecord {
                    zone: zone_idx,
                    task: task_idx,
                    command,
                    status,
                    duration_ms,
                });
            }
        }

        info!(
            group_id = %group_id,
            ok = outcome.counts.ok,
            pending = outcome.counts.pending,
            timeout = outcome.counts.timeout,
            error = outcome.counts.error,
            "batch complete"
        );

        outcome
    }
}
