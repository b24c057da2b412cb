//! Per-unit supervision: settle the job from the unit's signals, enforce the
//! deadline, clean up, then hand the slot back.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Event;
use crate::error::JobError;
use crate::job::Settlement;
use crate::unit::{Signal, WorkerUnit};

/// An admitted job, owned by its supervisor.
pub(super) struct Running {
    pub job_id: Uuid,
    pub category: String,
    pub settlement: Settlement,
    pub scratch_dir: PathBuf,
    pub timeout: Option<Duration>,
}

/// Posts the exit event when dropped, so the slot is released even if the
/// supervisor panics or its task is aborted.
struct SlotGuard {
    events: mpsc::UnboundedSender<Event>,
    category: String,
    job_id: Uuid,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let _ = self.events.send(Event::Exited {
            category: std::mem::take(&mut self.category),
            job_id: self.job_id,
        });
    }
}

/// Drive one unit to completion.
pub(super) async fn supervise(
    mut unit: Box<dyn WorkerUnit>,
    mut running: Running,
    events: mpsc::UnboundedSender<Event>,
) {
    let _slot = SlotGuard {
        events,
        category: running.category.clone(),
        job_id: running.job_id,
    };
    let job_id = running.job_id;
    let category = running.category.as_str();
    let started = Instant::now();
    let deadline = running.timeout.map(|limit| (started + limit, limit));

    loop {
        let signal = match deadline {
            Some((at, limit)) => match tokio::time::timeout_at(at, unit.next_signal()).await {
                Ok(signal) => signal,
                Err(_) => {
                    warn!(%job_id, %category, "worker timed out after {limit:?}, terminating");
                    unit.terminate().await;
                    running.settlement.fail(JobError::Timeout(limit));
                    break;
                }
            },
            None => unit.next_signal().await,
        };

        match signal {
            Signal::Success(value) => {
                if running.settlement.succeed(value) {
                    info!(%job_id, %category, "job succeeded");
                } else {
                    debug!(%job_id, %category, "ignoring extra success signal");
                }
            }
            Signal::Failure(error) => {
                if running.settlement.is_settled() {
                    debug!(%job_id, %category, "ignoring extra error signal: {error}");
                } else {
                    warn!(%job_id, %category, "job failed: {error}");
                    running.settlement.fail(JobError::Worker(error));
                }
            }
            Signal::Exit(report) => {
                if !running.settlement.is_settled() {
                    warn!(%job_id, %category, "worker exited ({report}) without a result");
                    running.settlement.fail(JobError::AbnormalExit(report));
                } else {
                    debug!(%job_id, %category, "worker exited ({report})");
                }
                break;
            }
        }
    }

    remove_scratch(&running.scratch_dir).await;
    debug!(
        %job_id,
        %category,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "worker finished"
    );
}

/// Remove a job's scratch directory. Missing is fine.
async fn remove_scratch(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("failed to remove scratch dir {}: {e}", dir.display()),
    }
}

/// Blocking variant for the bookkeeping task's spawn-failure path.
pub(super) fn remove_scratch_sync(dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("failed to remove scratch dir {}: {e}", dir.display()),
    }
}
