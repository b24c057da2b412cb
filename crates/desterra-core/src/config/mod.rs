mod channels;
mod defaults;
mod queue;

#[cfg(test)]
mod tests;

pub use channels::*;
pub use queue::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::DesterraError;
use defaults::*;

/// Top-level Desterra configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub desterra: DesterraConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
}

/// General bot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesterraConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DesterraConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Expanded data directory.
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand(&self.desterra.data_dir))
    }

    /// Directory holding the per-job scratch directories.
    pub fn scratch_root(&self) -> PathBuf {
        if self.queue.scratch_dir.is_empty() {
            self.data_dir().join("scratch")
        } else {
            PathBuf::from(shellexpand(&self.queue.scratch_dir))
        }
    }

    /// Directory for the rolling log file.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    /// Directory where the console channel writes media replies.
    pub fn outbox_dir(&self) -> PathBuf {
        self.data_dir().join("outbox")
    }

    /// Reject settings the dispatcher cannot honour.
    pub fn validate(&self) -> Result<(), DesterraError> {
        if self.queue.categories.is_empty() {
            return Err(DesterraError::Config(
                "no worker categories configured under [queue.categories]".into(),
            ));
        }
        for (name, category) in &self.queue.categories {
            if name.trim().is_empty() {
                return Err(DesterraError::Config("category names must not be empty".into()));
            }
            if category.limit == 0 {
                return Err(DesterraError::Config(format!(
                    "category '{name}': limit must be at least 1"
                )));
            }
            if let Some(program) = category.command.first() {
                if program.trim().is_empty() {
                    return Err(DesterraError::Config(format!(
                        "category '{name}': command program must not be empty"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist. The result is
/// validated either way.
pub fn load(path: &str) -> Result<Config, DesterraError> {
    let path = Path::new(path);
    let config = if !path.exists() {
        info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        Config::default()
    } else {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DesterraError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| DesterraError::Config(format!("failed to parse config: {}", e)))?
    };

    config.validate()?;
    Ok(config)
}
