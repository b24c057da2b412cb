//! Jobs and their single-assignment outcome.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::JobError;

pub(crate) type Outcome = Result<serde_json::Value, JobError>;

/// One unit of queued background work.
pub(crate) struct Job {
    pub id: Uuid,
    pub category: String,
    pub payload: serde_json::Value,
    pub settlement: Settlement,
}

impl Job {
    /// Create a job and the ticket its caller waits on.
    pub fn new(category: &str, payload: serde_json::Value) -> (Self, JobTicket) {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        let job = Self {
            id,
            category: category.to_string(),
            payload,
            settlement: Settlement { tx: Some(tx) },
        };
        let ticket = JobTicket {
            id,
            category: category.to_string(),
            rx,
        };
        (job, ticket)
    }
}

/// Write side of a job's outcome. The first `succeed`/`fail` wins; later
/// calls return `false` and change nothing. Dropped unsettled, it settles
/// with [`JobError::Abandoned`] so no caller waits forever.
pub(crate) struct Settlement {
    tx: Option<oneshot::Sender<Outcome>>,
}

impl Settlement {
    pub fn succeed(&mut self, value: serde_json::Value) -> bool {
        self.settle(Ok(value))
    }

    pub fn fail(&mut self, error: JobError) -> bool {
        self.settle(Err(error))
    }

    pub fn is_settled(&self) -> bool {
        self.tx.is_none()
    }

    fn settle(&mut self, outcome: Outcome) -> bool {
        match self.tx.take() {
            Some(tx) => {
                // The caller may have stopped waiting; that is not our problem.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }
}

impl Drop for Settlement {
    fn drop(&mut self) {
        self.settle(Err(JobError::Abandoned));
    }
}

/// Caller's handle on a submitted job. Await it for the outcome.
#[derive(Debug)]
pub struct JobTicket {
    id: Uuid,
    category: String,
    rx: oneshot::Receiver<Outcome>,
}

impl JobTicket {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn category(&self) -> &str {
        &self.category
    }
}

impl Future for JobTicket {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(JobError::Abandoned)))
    }
}
