use super::*;
use std::time::Duration;

#[test]
fn test_default_categories() {
    let cfg = Config::default();
    let limits: Vec<(&str, usize)> = cfg
        .queue
        .categories
        .iter()
        .map(|(k, v)| (k.as_str(), v.limit))
        .collect();
    assert_eq!(
        limits,
        vec![("image", 2), ("meme", 2), ("music", 2), ("sticker", 4)]
    );
    assert!(cfg.queue.categories.values().all(|c| c.is_builtin()));
    assert_eq!(cfg.queue.isolation, IsolationMode::Scratch);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_empty_toml_uses_defaults() {
    let cfg: Config = toml::from_str("").unwrap();
    assert_eq!(cfg.desterra.name, "Desterra");
    assert_eq!(cfg.desterra.data_dir, "~/.desterra");
    assert_eq!(cfg.queue.default_timeout_secs, 120);
    assert_eq!(cfg.queue.max_pending, 64);
    assert_eq!(cfg.queue.categories.len(), 4);
    assert!(cfg.channel.console.is_none());
}

#[test]
fn test_categories_from_toml_replace_defaults() {
    let toml_str = r#"
        [queue]
        isolation = "open"
        default_timeout_secs = 30

        [queue.categories.sticker]
        limit = 3
        timeout_secs = 0

        [queue.categories.meme]
        command = ["python3", "meme_worker.py"]
        max_pending = 5
    "#;
    let cfg: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(cfg.queue.isolation, IsolationMode::Open);
    assert_eq!(cfg.queue.categories.len(), 2);

    let sticker = &cfg.queue.categories["sticker"];
    assert_eq!(sticker.limit, 3);
    assert_eq!(cfg.queue.timeout_for(sticker), None);
    assert_eq!(cfg.queue.max_pending_for(sticker), Some(64));

    let meme = &cfg.queue.categories["meme"];
    assert_eq!(meme.limit, 2, "limit defaults to 2");
    assert!(!meme.is_builtin());
    assert_eq!(cfg.queue.timeout_for(meme), Some(Duration::from_secs(30)));
    assert_eq!(cfg.queue.max_pending_for(meme), Some(5));
}

#[test]
fn test_zero_max_pending_is_unbounded() {
    let toml_str = r#"
        [queue]
        max_pending = 0
    "#;
    let cfg: Config = toml::from_str(toml_str).unwrap();
    let sticker = &cfg.queue.categories["sticker"];
    assert_eq!(cfg.queue.max_pending_for(sticker), None);
}

#[test]
fn test_validate_rejects_zero_limit() {
    let mut cfg = Config::default();
    cfg.queue.categories.get_mut("image").unwrap().limit = 0;
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("image"), "got: {err}");
}

#[test]
fn test_validate_rejects_empty_program() {
    let mut cfg = Config::default();
    cfg.queue.categories.get_mut("music").unwrap().command = vec!["".into()];
    assert!(matches!(cfg.validate(), Err(DesterraError::Config(_))));
}

#[test]
fn test_validate_rejects_no_categories() {
    let mut cfg = Config::default();
    cfg.queue.categories.clear();
    assert!(cfg.validate().is_err());
}

#[test]
fn test_scratch_root_defaults_under_data_dir() {
    let mut cfg = Config::default();
    cfg.desterra.data_dir = "/srv/bot".into();
    assert_eq!(cfg.scratch_root(), PathBuf::from("/srv/bot/scratch"));
    assert_eq!(cfg.log_dir(), PathBuf::from("/srv/bot/logs"));
    assert_eq!(cfg.outbox_dir(), PathBuf::from("/srv/bot/outbox"));

    cfg.queue.scratch_dir = "/var/tmp/jobs".into();
    assert_eq!(cfg.scratch_root(), PathBuf::from("/var/tmp/jobs"));
}

#[test]
fn test_console_channel_defaults() {
    let toml_str = r#"
        [channel.console]
    "#;
    let cfg: Config = toml::from_str(toml_str).unwrap();
    let console = cfg.channel.console.unwrap();
    assert!(console.enabled);
    assert_eq!(console.user, "console");
}

#[test]
fn test_load_missing_file_uses_defaults() {
    let cfg = load("/nonexistent/__desterra_test__/config.toml").unwrap();
    assert_eq!(cfg.queue.categories.len(), 4);
}

#[test]
fn test_load_reports_parse_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[queue\nlimit = ").unwrap();
    let err = load(path.to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("failed to parse config"));
}

#[test]
fn test_load_validates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[queue.categories.sticker]\nlimit = 0\n").unwrap();
    assert!(load(path.to_str().unwrap()).is_err());
}

#[test]
fn test_shellexpand_home() {
    let home = std::env::var("HOME").unwrap_or_default();
    if !home.is_empty() {
        assert_eq!(shellexpand("~/x"), format!("{home}/x"));
    }
    assert_eq!(shellexpand("/abs/path"), "/abs/path");
}
