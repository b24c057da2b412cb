//! The seam between the dispatcher and whatever actually runs a job.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use uuid::Uuid;

use crate::error::JobError;

/// Everything a unit gets to know about its job.
#[derive(Debug, Clone)]
pub struct UnitSpec {
    pub job_id: Uuid,
    pub category: String,
    pub payload: serde_json::Value,
    /// Writable directory owned by this job; removed after the unit exits.
    pub scratch_dir: PathBuf,
}

/// One observation from a running unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// The unit reported a result.
    Success(serde_json::Value),
    /// The unit reported an error.
    Failure(String),
    /// The unit has terminated. Always the last signal.
    Exit(ExitReport),
}

/// How a unit terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code, `None` when killed by a signal or lost.
    pub code: Option<i32>,
    pub detail: String,
}

impl ExitReport {
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            detail: format!("exit status: {code}"),
        }
    }

    /// The unit's fate is unknown (e.g. waiting on it failed).
    pub fn lost(detail: impl Into<String>) -> Self {
        Self {
            code: None,
            detail: detail.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitReport {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            detail: status.to_string(),
        }
    }
}

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.detail)
    }
}

/// A running worker execution unit, bound to exactly one job.
#[async_trait]
pub trait WorkerUnit: Send {
    /// Wait for the next signal. After [`Signal::Exit`] the unit is finished
    /// and must not be polled again.
    async fn next_signal(&mut self) -> Signal;

    /// Forcibly stop the unit and reap it.
    async fn terminate(&mut self);
}

/// Starts worker units.
///
/// `spawn` is synchronous so admission never suspends; the dispatcher calls
/// it in admission order.
pub trait Spawner: Send + Sync + 'static {
    fn spawn(&self, spec: UnitSpec) -> Result<Box<dyn WorkerUnit>, JobError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_report_code() {
        let report = ExitReport::code(3);
        assert!(!report.success());
        assert_eq!(report.to_string(), "exit status: 3");
        assert!(ExitReport::code(0).success());
    }

    #[test]
    fn test_lost_report_is_not_success() {
        let report = ExitReport::lost("wait failed");
        assert_eq!(report.code, None);
        assert!(!report.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_from_exit_status() {
        use std::os::unix::process::ExitStatusExt;
        let report = ExitReport::from(ExitStatus::from_raw(2 << 8));
        assert_eq!(report.code, Some(2));

        let killed = ExitReport::from(ExitStatus::from_raw(9));
        assert_eq!(killed.code, None);
        assert!(killed.detail.contains("signal"));
    }
}
