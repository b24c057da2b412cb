use std::time::Duration;
use thiserror::Error;

use crate::unit::ExitReport;

/// Why a job did not produce a success value.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// No queue is configured for the requested category.
    #[error("unknown worker category '{0}'")]
    UnknownCategory(String),

    /// The category's pending queue is at capacity.
    #[error("queue '{category}' is full ({max_pending} jobs pending)")]
    QueueFull { category: String, max_pending: usize },

    /// The worker could not be started.
    #[error("failed to start worker: {0}")]
    Spawn(String),

    /// The worker reported an error.
    #[error("{0}")]
    Worker(String),

    /// The worker exited without reporting a result.
    #[error("worker exited ({0}) without reporting a result")]
    AbnormalExit(ExitReport),

    /// The worker exceeded its time budget and was killed.
    #[error("worker timed out after {0:?}")]
    Timeout(Duration),

    /// The dispatcher stopped before the job could run.
    #[error("dispatcher is shutting down")]
    ShuttingDown,

    /// The job's supervisor ended without settling it.
    #[error("job was abandoned before it settled")]
    Abandoned,
}
