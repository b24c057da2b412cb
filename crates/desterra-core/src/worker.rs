//! Wire protocol between the dispatcher and a worker process.
//!
//! The dispatcher writes one [`WorkerRequest`] as JSON to the worker's stdin
//! and closes it. The worker answers on stdout with JSON lines, each a
//! [`WorkerReply`]; only the first one counts.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Env var holding the job ID.
pub const ENV_JOB_ID: &str = "DESTERRA_JOB_ID";
/// Env var holding the job category.
pub const ENV_CATEGORY: &str = "DESTERRA_CATEGORY";
/// Env var holding the per-job scratch directory.
pub const ENV_SCRATCH_DIR: &str = "DESTERRA_SCRATCH_DIR";

/// Job description handed to a worker on stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub job_id: Uuid,
    pub category: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Terminal signal emitted by a worker on stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WorkerReply {
    Success {
        #[serde(default)]
        value: serde_json::Value,
    },
    Error {
        error: String,
    },
}

impl WorkerReply {
    /// Parse one stdout line. Returns `None` for anything that is not a reply,
    /// so stray prints from a worker do not break the protocol.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if !line.starts_with('{') {
            return None;
        }
        serde_json::from_str(line).ok()
    }

    /// Serialize as a single stdout line (no trailing newline).
    pub fn to_line(&self) -> String {
        // A reply is a tagged map of strings and JSON values; it always serializes.
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"status":"error","error":"failed to serialize worker reply"}"#.to_string()
        })
    }
}

impl From<Result<serde_json::Value, String>> for WorkerReply {
    fn from(result: Result<serde_json::Value, String>) -> Self {
        match result {
            Ok(value) => Self::Success { value },
            Err(error) => Self::Error { error },
        }
    }
}
