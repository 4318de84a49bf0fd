//! Batch runner module for vidshrink
//!
//! Drives one batch from planning to the final summary. Items are handled
//! strictly one at a time: skip when the output already exists, otherwise
//! encode and persist the checkpoint before moving on.

use crate::checkpoint::{BatchCheckpoint, CheckpointStore};
use crate::config::Config;
use crate::encode::{EncodeError, EncodeOutcome, EncodeParams, EncodeSupervisor};
use crate::plan::{display_name, BatchPlanner, PlanError, WorkItem};
use crate::progress::ProgressReporter;
use crate::stats::{BatchStatistics, BatchSummary};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors that abort a whole batch
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("planning failed: {0}")]
    Plan(#[from] PlanError),
}

/// Stage the runner is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Planning,
    Skipping,
    Encoding,
    Summarizing,
    Done,
}

impl RunnerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerState::Idle => "idle",
            RunnerState::Planning => "planning",
            RunnerState::Skipping => "skipping",
            RunnerState::Encoding => "encoding",
            RunnerState::Summarizing => "summarizing",
            RunnerState::Done => "done",
        }
    }
}

/// What happened to one work item
#[derive(Debug)]
pub enum ItemOutcome {
    /// Output already existed
    Skipped,
    Encoded(EncodeOutcome),
    /// Encoder failed or could not be launched; the item is not retried
    Failed(EncodeError),
}

#[derive(Debug)]
pub struct ItemReport {
    pub item: WorkItem,
    pub outcome: ItemOutcome,
}

/// Everything a finished run produced
#[derive(Debug)]
pub struct BatchReport {
    pub summary: BatchSummary,
    pub items: Vec<ItemReport>,
}

/// A planned item and whether its output already exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedItem {
    pub item: WorkItem,
    pub done: bool,
}

/// Runs one batch over a folder
#[derive(Debug)]
pub struct BatchRunner {
    folder: PathBuf,
    planner: BatchPlanner,
    store: CheckpointStore,
    supervisor: EncodeSupervisor,
    quality: u32,
    show_progress: bool,
    state: RunnerState,
}

impl BatchRunner {
    pub fn new(config: &Config, folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            planner: BatchPlanner::from_config(&config.batch),
            store: CheckpointStore::new(&config.batch.checkpoint_path),
            supervisor: EncodeSupervisor::new(config.encoder.clone()),
            quality: config.encoder.quality,
            show_progress: true,
            state: RunnerState::Idle,
        }
    }

    /// Enable or disable the progress bar
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    fn transition(&mut self, next: RunnerState) {
        if self.state != next {
            debug!(from = self.state.as_str(), to = next.as_str(), "runner state");
            self.state = next;
        }
    }

    /// Plan without encoding and without touching the checkpoint
    pub fn plan_only(&self) -> Result<Vec<PlannedItem>, RunnerError> {
        let checkpoint = self.store.load();
        let plan = self.planner.plan(&self.folder, &checkpoint)?;
        Ok(plan
            .items
            .into_iter()
            .map(|item| PlannedItem {
                done: item.is_done(),
                item,
            })
            .collect())
    }

    /// Run the batch to completion.
    ///
    /// Only planning errors are returned; per-item failures are reported in
    /// the [`BatchReport`] and the batch carries on.
    pub async fn run(mut self) -> Result<BatchReport, RunnerError> {
        let run_id = Uuid::new_v4();

        self.transition(RunnerState::Planning);
        let mut checkpoint = self.store.load();
        if let Some(previous) = &checkpoint.folder {
            if previous != &self.folder {
                warn!(
                    previous = %previous.display(),
                    current = %self.folder.display(),
                    "checkpoint was written for a different folder"
                );
            }
        }

        let plan = self.planner.plan(&self.folder, &checkpoint)?;
        info!(
            %run_id,
            folder = %self.folder.display(),
            planned = plan.len(),
            listing_len = plan.listing_len,
            start_index = plan.start_index,
            "starting batch"
        );

        let mut stats = BatchStatistics::begin(&plan.items);
        let progress = if self.show_progress {
            ProgressReporter::new(plan.len())
        } else {
            ProgressReporter::hidden(plan.len())
        };

        let mut reports = Vec::with_capacity(plan.len());
        for item in &plan.items {
            if item.is_done() {
                self.transition(RunnerState::Skipping);
                debug!(output = %item.output_path.display(), "output exists, skipping");
                stats.skipped += 1;
                progress.advance();
                reports.push(ItemReport {
                    item: item.clone(),
                    outcome: ItemOutcome::Skipped,
                });
                continue;
            }

            self.transition(RunnerState::Encoding);
            let source_name = display_name(&item.source_path);
            progress.set_current(&source_name);

            let params = EncodeParams::new(
                item.source_path.clone(),
                item.output_path.clone(),
                self.quality,
            );
            let result = self
                .supervisor
                .encode(&params, |sample| progress.on_sample(sample))
                .await;

            self.record(&mut checkpoint, item, plan.listing_len, run_id);

            let outcome = match result {
                Ok(outcome) => {
                    stats.encoded += 1;
                    progress.println(format!(
                        "Encoded {} -> {}",
                        source_name,
                        display_name(&item.output_path)
                    ));
                    ItemOutcome::Encoded(outcome)
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(source = %item.source_path.display(), error = %e, "encode failed");
                    progress.println(format!(
                        "Failed to encode {} ({}): {}",
                        source_name,
                        e.kind(),
                        e
                    ));
                    ItemOutcome::Failed(e)
                }
            };
            progress.advance();
            reports.push(ItemReport {
                item: item.clone(),
                outcome,
            });
        }
        progress.finish();

        self.transition(RunnerState::Summarizing);
        let summary = stats.finish(&plan.items);
        info!(
            %run_id,
            encoded = summary.encoded,
            skipped = summary.skipped,
            failed = summary.failed,
            "batch finished"
        );

        self.transition(RunnerState::Done);
        Ok(BatchReport {
            summary,
            items: reports,
        })
    }

    /// Move the checkpoint past `item` and persist it.
    ///
    /// A failed save only costs redoing work on the next run, so it is
    /// logged and the batch continues.
    fn record(
        &self,
        checkpoint: &mut BatchCheckpoint,
        item: &WorkItem,
        listing_len: usize,
        run_id: Uuid,
    ) {
        checkpoint.advance_past(item.index, listing_len);
        checkpoint.folder = Some(self.folder.clone());
        checkpoint.run_id = Some(run_id);

        if let Err(e) = self.store.save(checkpoint) {
            warn!(
                path = %self.store.path().display(),
                error = %e,
                "failed to save checkpoint"
            );
        }
    }
}
