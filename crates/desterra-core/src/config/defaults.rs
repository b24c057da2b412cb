use std::collections::BTreeMap;

use super::CategoryConfig;

pub(super) fn default_name() -> String {
    "Desterra".to_string()
}
pub(super) fn default_data_dir() -> String {
    "~/.desterra".to_string()
}
pub(super) fn default_log_level() -> String {
    "info".to_string()
}
pub(super) fn default_true() -> bool {
    true
}
pub(super) fn default_timeout_secs() -> u64 {
    120
}
pub(super) fn default_max_pending() -> usize {
    64
}
pub(super) fn default_limit() -> usize {
    2
}

/// Built-in categories: stickers are cheap and local, the rest hit the network.
pub(super) fn default_categories() -> BTreeMap<String, CategoryConfig> {
    [("sticker", 4), ("image", 2), ("meme", 2), ("music", 2)]
        .into_iter()
        .map(|(name, limit)| {
            (
                name.to_string(),
                CategoryConfig {
                    limit,
                    ..Default::default()
                },
            )
        })
        .collect()
}
