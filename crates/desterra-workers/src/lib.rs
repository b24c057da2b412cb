//! # desterra-workers
//!
//! Handlers that run inside a built-in worker process (`desterra worker
//! <category>`). A worker reads one [`WorkerRequest`] from stdin and writes
//! exactly one [`WorkerReply`] line to stdout.

pub mod sticker;

use desterra_core::worker::{WorkerReply, WorkerRequest};
use serde_json::Value;
use std::io::{Read, Write};
use thiserror::Error;
use tracing::{info, warn};

/// Failure inside a built-in worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// No built-in handler exists for the category.
    #[error("category '{0}' has no built-in worker; configure a `command` for it")]
    Unsupported(String),

    /// The request or its payload is malformed.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Decoding or encoding the image failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Categories with a built-in handler.
pub const BUILTIN_CATEGORIES: &[&str] = &["sticker"];

/// Run the handler for the request's category.
pub fn handle(request: &WorkerRequest) -> Result<Value, WorkerError> {
    match request.category.as_str() {
        "sticker" => sticker::render(&request.payload),
        other => Err(WorkerError::Unsupported(other.to_string())),
    }
}

/// Read a request from `input`, handle it, write the reply line to `output`.
///
/// `category` is the one the process was started for; a request naming a
/// different category is refused. Only I/O failures on `output` are
/// returned; everything else is reported to the dispatcher as an error reply.
pub fn run(category: &str, mut input: impl Read, mut output: impl Write) -> Result<(), WorkerError> {
    let reply = match read_request(&mut input) {
        Ok(request) if request.category != category => Err(format!(
            "request for '{}' sent to the '{category}' worker",
            request.category
        )),
        Ok(request) => {
            info!(job_id = %request.job_id, %category, "handling job");
            handle(&request).map_err(|e| e.to_string())
        }
        Err(e) => Err(e.to_string()),
    };
    if let Err(error) = &reply {
        warn!(%category, "job failed: {error}");
    }

    writeln!(output, "{}", WorkerReply::from(reply).to_line())?;
    output.flush()?;
    Ok(())
}

fn read_request(input: &mut impl Read) -> Result<WorkerRequest, WorkerError> {
    let mut raw = String::new();
    input.read_to_string(&mut raw)?;
    serde_json::from_str(raw.trim())
        .map_err(|e| WorkerError::InvalidPayload(format!("malformed request: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn request(category: &str, payload: Value) -> WorkerRequest {
        WorkerRequest {
            job_id: Uuid::new_v4(),
            category: category.into(),
            payload,
        }
    }

    fn run_with(category: &str, input: &str) -> WorkerReply {
        let mut out = Vec::new();
        run(category, input.as_bytes(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1, "exactly one reply line");
        WorkerReply::parse_line(&text).unwrap()
    }

    #[test]
    fn test_unsupported_category() {
        let err = handle(&request("music", json!({"query": "x"}))).unwrap_err();
        assert!(matches!(err, WorkerError::Unsupported(ref c) if c == "music"));
        assert!(err.to_string().contains("command"));
    }

    #[test]
    fn test_run_reports_malformed_request() {
        match run_with("sticker", "this is not json") {
            WorkerReply::Error { error } => assert!(error.contains("malformed request")),
            other => panic!("expected error reply, got {other:?}"),
        }
    }

    #[test]
    fn test_run_refuses_other_category() {
        let line = serde_json::to_string(&request("meme", json!({}))).unwrap();
        assert!(matches!(run_with("sticker", &line), WorkerReply::Error { .. }));
    }

    #[test]
    fn test_run_reports_bad_payload_as_error() {
        let line = serde_json::to_string(&request("sticker", json!({"media": 5}))).unwrap();
        match run_with("sticker", &line) {
            WorkerReply::Error { error } => assert!(error.starts_with("invalid payload")),
            other => panic!("expected error reply, got {other:?}"),
        }
    }
}
