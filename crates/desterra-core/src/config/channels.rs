use serde::{Deserialize, Serialize};

use super::defaults::default_true;

/// Channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelConfig {
    pub console: Option<ConsoleConfig>,
}

/// Local console channel config (stdin/stdout chat).
///
/// Media replies are written to `{data_dir}/outbox/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Sender ID attached to console messages.
    #[serde(default = "default_console_user")]
    pub user: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user: default_console_user(),
        }
    }
}

fn default_console_user() -> String {
    "console".to_string()
}
