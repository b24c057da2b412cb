//! Per-category FIFO queue with a live-worker counter.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

use crate::job::Job;

/// Point-in-time view of one category queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub category: String,
    pub limit: usize,
    pub active: usize,
    pub pending: usize,
}

/// Pending jobs plus the number of running units for one category.
///
/// Invariant: `active <= limit`, and jobs leave `pending` only through
/// [`CategoryQueue::admit_next`], which refuses while the queue is at its limit.
pub(crate) struct CategoryQueue {
    name: String,
    pending: VecDeque<Job>,
    active: usize,
    limit: usize,
    max_pending: Option<usize>,
    timeout: Option<Duration>,
}

impl CategoryQueue {
    pub fn new(
        name: &str,
        limit: usize,
        max_pending: Option<usize>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            name: name.to_string(),
            pending: VecDeque::new(),
            active: 0,
            limit: limit.max(1),
            max_pending,
            timeout,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn max_pending(&self) -> Option<usize> {
        self.max_pending
    }

    pub fn active(&self) -> usize {
        self.active
    }

    /// Append to the tail. Hands the job back when the pending cap is reached.
    pub fn push(&mut self, job: Job) -> Result<(), Job> {
        if let Some(max) = self.max_pending {
            if self.pending.len() >= max {
                return Err(job);
            }
        }
        self.pending.push_back(job);
        Ok(())
    }

    /// Pop the oldest pending job and claim a slot for it, if one is free.
    pub fn admit_next(&mut self) -> Option<Job> {
        if self.active >= self.limit {
            return None;
        }
        let job = self.pending.pop_front()?;
        self.active += 1;
        Some(job)
    }

    /// Give back a slot claimed by [`CategoryQueue::admit_next`].
    pub fn release(&mut self) {
        debug_assert!(self.active > 0, "release without a running unit");
        self.active = self.active.saturating_sub(1);
    }

    /// Remove every pending job (used on shutdown).
    pub fn drain_pending(&mut self) -> Vec<Job> {
        self.pending.drain(..).collect()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            category: self.name.clone(),
            limit: self.limit,
            active: self.active,
            pending: self.pending.len(),
        }
    }
}
