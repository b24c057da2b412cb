use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::defaults::*;

/// How far a worker process can reach into the host filesystem.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    /// Writes only to the job's scratch directory, `/tmp` and `/dev` (default).
    #[default]
    Scratch,
    /// No OS-level restrictions.
    Open,
}

impl IsolationMode {
    /// Human-readable name for display (e.g. in `status`).
    pub fn display_name(&self) -> &str {
        match self {
            Self::Scratch => "scratch",
            Self::Open => "open",
        }
    }
}

/// Worker queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub isolation: IsolationMode,
    /// Per-job timeout applied when a category sets none. 0 = no timeout.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Pending-queue cap applied when a category sets none. 0 = unbounded.
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
    /// Parent of the per-job scratch directories. Empty = `{data_dir}/scratch`.
    #[serde(default)]
    pub scratch_dir: String,
    #[serde(default = "default_categories")]
    pub categories: BTreeMap<String, CategoryConfig>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            isolation: IsolationMode::default(),
            default_timeout_secs: default_timeout_secs(),
            max_pending: default_max_pending(),
            scratch_dir: String::new(),
            categories: default_categories(),
        }
    }
}

impl QueueConfig {
    /// Effective timeout for a category (`None` = unlimited).
    pub fn timeout_for(&self, category: &CategoryConfig) -> Option<Duration> {
        match category.timeout_secs.unwrap_or(self.default_timeout_secs) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Effective pending cap for a category (`None` = unbounded).
    pub fn max_pending_for(&self, category: &CategoryConfig) -> Option<usize> {
        match category.max_pending.unwrap_or(self.max_pending) {
            0 => None,
            n => Some(n),
        }
    }
}

/// One worker category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Maximum concurrently running workers.
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_pending: Option<usize>,
    /// Worker program and arguments. Empty = built-in worker.
    #[serde(default)]
    pub command: Vec<String>,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            timeout_secs: None,
            max_pending: None,
            command: Vec::new(),
        }
    }
}

impl CategoryConfig {
    /// Whether jobs run through the bot's own `worker` subcommand.
    pub fn is_builtin(&self) -> bool {
        self.command.is_empty()
    }
}
