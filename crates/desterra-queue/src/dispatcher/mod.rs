//! Dispatcher: owns every category queue and drives admission.
//!
//! All queue bookkeeping happens on one tokio task that handles events one
//! at a time (submit, unit exit, stats, shutdown), so `pending` and `active`
//! need no locks. Admission runs synchronously inside that task after every
//! submit and every exit. Units themselves run in parallel, each watched by
//! its own supervisor task.

mod supervisor;


use desterra_core::config::QueueConfig;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::category::{CategoryQueue, QueueStats};
use crate::error::JobError;
use crate::job::{Job, JobTicket};
use crate::unit::{Spawner, UnitSpec};

/// Static settings of one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySettings {
    pub limit: usize,
    pub max_pending: Option<usize>,
    pub timeout: Option<Duration>,
}

impl CategorySettings {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            max_pending: None,
            timeout: None,
        }
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = Some(max_pending);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Events processed by the bookkeeping task.
pub(crate) enum Event {
    Submit(Job),
    Exited { category: String, job_id: Uuid },
    Stats(oneshot::Sender<Vec<QueueStats>>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running dispatcher. Cheap to clone.
///
/// The bookkeeping task stops after [`Dispatcher::shutdown`], or once every
/// handle is dropped and no unit is running.
#[derive(Clone)]
pub struct Dispatcher {
    events: mpsc::UnboundedSender<Event>,
    categories: Arc<BTreeSet<String>>,
}

impl Dispatcher {
    /// Start the bookkeeping task. Must be called inside a tokio runtime.
    ///
    /// Each job gets a scratch directory `{scratch_root}/{job_id}`.
    pub fn start(
        categories: BTreeMap<String, CategorySettings>,
        spawner: Arc<dyn Spawner>,
        scratch_root: PathBuf,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let names: BTreeSet<String> = categories.keys().cloned().collect();
        let queues = categories
            .iter()
            .map(|(name, s)| {
                (
                    name.clone(),
                    CategoryQueue::new(name, s.limit, s.max_pending, s.timeout),
                )
            })
            .collect();

        let bookkeeper = Bookkeeper {
            queues,
            spawner,
            events: tx.downgrade(),
            scratch_root,
            closing: false,
            shutdown_waiters: Vec::new(),
        };
        tokio::spawn(bookkeeper.run(rx));

        Self {
            events: tx,
            categories: Arc::new(names),
        }
    }

    /// Start a dispatcher with the categories, limits, caps and timeouts
    /// from the `[queue]` config section.
    pub fn from_config(
        config: &QueueConfig,
        spawner: Arc<dyn Spawner>,
        scratch_root: PathBuf,
    ) -> Self {
        let categories = config
            .categories
            .iter()
            .map(|(name, c)| {
                (
                    name.clone(),
                    CategorySettings {
                        limit: c.limit,
                        max_pending: config.max_pending_for(c),
                        timeout: config.timeout_for(c),
                    },
                )
            })
            .collect();
        Self::start(categories, spawner, scratch_root)
    }

    /// Configured category names.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(String::as_str)
    }

    /// Queue a job without waiting for it.
    ///
    /// Unknown categories are rejected here, before anything is queued.
    pub fn submit(
        &self,
        category: &str,
        payload: serde_json::Value,
    ) -> Result<JobTicket, JobError> {
        if !self.categories.contains(category) {
            return Err(JobError::UnknownCategory(category.to_string()));
        }
        let (job, ticket) = Job::new(category, payload);
        self.events
            .send(Event::Submit(job))
            .map_err(|_| JobError::ShuttingDown)?;
        Ok(ticket)
    }

    /// Queue a job and wait for its outcome.
    pub async fn enqueue(
        &self,
        category: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, JobError> {
        self.submit(category, payload)?.await
    }

    /// Snapshot of every queue. Empty once the dispatcher has stopped.
    pub async fn stats(&self) -> Vec<QueueStats> {
        let (tx, rx) = oneshot::channel();
        if self.events.send(Event::Stats(tx)).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Stop admitting, reject pending jobs with [`JobError::ShuttingDown`],
    /// and wait until every running unit has exited and been cleaned up.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.events.send(Event::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

/// State owned by the bookkeeping task.
struct Bookkeeper {
    queues: BTreeMap<String, CategoryQueue>,
    spawner: Arc<dyn Spawner>,
    /// Weak so that dropping every `Dispatcher` handle can end the task.
    events: mpsc::WeakUnboundedSender<Event>,
    scratch_root: PathBuf,
    closing: bool,
    shutdown_waiters: Vec<oneshot::Sender<()>>,
}

impl Bookkeeper {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Event>) {
        debug!("dispatcher started with {} categories", self.queues.len());
        while let Some(event) = rx.recv().await {
            match event {
                Event::Submit(job) => self.on_submit(job),
                Event::Exited { category, job_id } => self.on_exit(&category, job_id),
                Event::Stats(reply) => {
                    let _ = reply.send(self.stats());
                }
                Event::Shutdown(done) => self.on_shutdown(done),
            }

            if self.closing && self.active_total() == 0 {
                break;
            }
        }

        // Refuse new sends before waking waiters, then settle whatever
        // slipped in meanwhile.
        rx.close();
        while let Ok(event) = rx.try_recv() {
            match event {
                Event::Submit(mut job) => {
                    job.settlement.fail(JobError::ShuttingDown);
                }
                Event::Stats(reply) => {
                    let _ = reply.send(Vec::new());
                }
                Event::Shutdown(done) => self.shutdown_waiters.push(done),
                Event::Exited { .. } => {}
            }
        }
        self.reject_pending();
        for waiter in self.shutdown_waiters.drain(..) {
            let _ = waiter.send(());
        }
        info!("dispatcher stopped");
    }

    fn on_submit(&mut self, mut job: Job) {
        if self.closing {
            job.settlement.fail(JobError::ShuttingDown);
            return;
        }
        let Some(queue) = self.queues.get_mut(&job.category) else {
            // Handles validate categories; this only guards against drift.
            let category = job.category.clone();
            job.settlement.fail(JobError::UnknownCategory(category));
            return;
        };

        let category = job.category.clone();
        let job_id = job.id;
        if let Err(mut rejected) = queue.push(job) {
            let max_pending = queue.max_pending().unwrap_or_default();
            warn!(%job_id, %category, "queue full, rejecting job");
            rejected.settlement.fail(JobError::QueueFull {
                category,
                max_pending,
            });
            return;
        }

        debug!(%job_id, %category, "job queued");
        self.admit(&category);
    }

    fn on_exit(&mut self, category: &str, job_id: Uuid) {
        if let Some(queue) = self.queues.get_mut(category) {
            queue.release();
            debug!(%job_id, %category, active = queue.active(), "worker slot released");
        }
        self.admit(category);
    }

    fn on_shutdown(&mut self, done: oneshot::Sender<()>) {
        if !self.closing {
            info!(running = self.active_total(), "dispatcher shutting down");
        }
        self.closing = true;
        self.reject_pending();
        self.shutdown_waiters.push(done);
    }

    /// Launch pending jobs of `category` while it has free slots.
    fn admit(&mut self, category: &str) {
        if self.closing {
            return;
        }
        let Some(queue) = self.queues.get_mut(category) else {
            return;
        };

        while let Some(job) = queue.admit_next() {
            let Job {
                id,
                category,
                payload,
                mut settlement,
            } = job;
            let timeout = queue.timeout();
            let scratch_dir = self.scratch_root.join(id.to_string());

            // Blocking on purpose: admission stays synchronous and a scratch
            // dir is one empty directory.
            if let Err(e) = std::fs::create_dir_all(&scratch_dir) {
                warn!(job_id = %id, %category, "failed to create scratch dir: {e}");
                settlement.fail(JobError::Spawn(format!(
                    "failed to create scratch dir {}: {e}",
                    scratch_dir.display()
                )));
                queue.release();
                continue;
            }

            let Some(events) = self.events.upgrade() else {
                // Every handle is gone and the channel is closing; nobody
                // can observe this job anymore.
                settlement.fail(JobError::ShuttingDown);
                supervisor::remove_scratch_sync(&scratch_dir);
                queue.release();
                continue;
            };

            let spec = UnitSpec {
                job_id: id,
                category: category.clone(),
                payload,
                scratch_dir: scratch_dir.clone(),
            };
            let unit = match self.spawner.spawn(spec) {
                Ok(unit) => unit,
                Err(e) => {
                    warn!(job_id = %id, %category, "failed to launch worker: {e}");
                    settlement.fail(e);
                    supervisor::remove_scratch_sync(&scratch_dir);
                    queue.release();
                    continue;
                }
            };

            info!(job_id = %id, %category, active = queue.active(), "worker admitted");
            let running = supervisor::Running {
                job_id: id,
                category,
                settlement,
                scratch_dir,
                timeout,
            };
            tokio::spawn(supervisor::supervise(unit, running, events));
        }
    }

    fn reject_pending(&mut self) {
        for queue in self.queues.values_mut() {
            for mut job in queue.drain_pending() {
                job.settlement.fail(JobError::ShuttingDown);
            }
        }
    }

    fn active_total(&self) -> usize {
        self.queues.values().map(CategoryQueue::active).sum()
    }

    fn stats(&self) -> Vec<QueueStats> {
        self.queues.values().map(CategoryQueue::stats).collect()
    }
}
