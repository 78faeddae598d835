// src/batch/mod.rs
// =============================================================================
// This module schedules batches of URL probes and tracks their progress.
//
// Pieces:
// - limiter: a counting semaphore shared by every batch, with in-flight and
//   peak counters for instrumentation
// - store: the registry of batches and the per-batch state readers see
// - scheduler: submit / status / list / delete, plus the fan-out that runs
//   each batch in the background
//
// Lifecycle of a batch:
//   submit -> running -> (every URL settled) -> ready
// Deletion removes a batch from the store at any point; it is not a state.
// =============================================================================

mod limiter;
mod scheduler;
mod store;

pub use limiter::DEFAULT_CONCURRENCY;
pub use scheduler::{Scheduler, SchedulerConfig};
pub use store::{BatchId, BatchSnapshot, TaskStore};

/// Errors surfaced synchronously to callers of the scheduler.
///
/// Per-URL probe failures never show up here; they live in each
/// `ProbeResult`.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("task '{0}' not found")]
    NotFound(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
