//! vidshrink
//!
//! Resumable batch re-encoding of a folder of videos: plans the worklist,
//! supervises one encoder child per file and records progress in a
//! checkpoint so an interrupted batch picks up where it stopped.

pub mod checkpoint;
pub mod encode;
pub mod plan;
pub mod progress;
pub mod runner;
pub mod startup;
pub mod stats;

#[cfg(test)]
mod testing;

pub use checkpoint::{BatchCheckpoint, CheckpointStore, CHECKPOINT_VERSION};
pub use encode::{
    build_encoder_command, parse_progress_line, EncodeError, EncodeOutcome, EncodeParams,
    EncodeProgressSample, EncodeSupervisor,
};
pub use plan::{output_path_for, BatchPlanner, Plan, PlanError, WorkItem};
pub use progress::ProgressReporter;
pub use runner::{
    BatchReport, BatchRunner, ItemOutcome, ItemReport, PlannedItem, RunnerError, RunnerState,
};
pub use startup::{check_encoder_available, StartupError};
pub use stats::{format_size, BatchStatistics, BatchSummary};
pub use vidshrink_config as config;
pub use vidshrink_config::Config;
