mod commands;
mod console;
mod gateway;

use clap::{Parser, Subcommand};
use desterra_core::{config, media::Media, traits::Channel};
use desterra_queue::{Dispatcher, ProcessSpawner};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "desterra",
    version,
    about = "Desterra — chat bot with a bounded worker queue for media jobs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml", env = "DESTERRA_CONFIG", global = true)]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot on every enabled channel.
    Start,
    /// Show configuration and worker categories.
    Status,
    /// Run a single job through the queue and print its result.
    Enqueue {
        /// Worker category (e.g. sticker, image, meme, music).
        category: String,
        /// Text argument; sent as `prompt` for image, `query` for music,
        /// `text` otherwise.
        #[arg(long)]
        text: Option<String>,
        /// File sent as base64 `media` with its MIME type.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Raw JSON object used as the base payload.
        #[arg(long)]
        json: Option<String>,
        /// Where to write media from the result (defaults to the outbox).
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Built-in worker entry point; reads one job from stdin.
    #[command(hide = true)]
    Worker {
        category: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            let cfg = config::load(&cli.config)?;
            let _log_guard = init_logging(&cfg.desterra.log_level, Some(&cfg.log_dir()))?;

            let scratch_root = cfg.scratch_root();
            std::fs::create_dir_all(&scratch_root)?;
            purge_scratch(&scratch_root);

            let dispatcher = build_dispatcher(&cfg)?;

            let mut channels: HashMap<String, Arc<dyn Channel>> = HashMap::new();
            if let Some(ref console_cfg) = cfg.channel.console {
                if console_cfg.enabled {
                    let channel = console::ConsoleChannel::new(console_cfg.clone(), cfg.outbox_dir());
                    channels.insert("console".to_string(), Arc::new(channel));
                }
            }

            if channels.is_empty() {
                anyhow::bail!("No channels enabled. Enable at least one channel in config.toml.");
            }

            println!("{} — starting...", cfg.desterra.name);
            let gw = Arc::new(gateway::Gateway::new(channels, dispatcher));
            gw.run().await?;
        }
        Commands::Status => {
            let cfg = config::load(&cli.config)?;
            println!("{} — Status\n", cfg.desterra.name);
            println!("Config:    {}", cli.config);
            println!("Data dir:  {}", cfg.data_dir().display());
            println!("Scratch:   {}", cfg.scratch_root().display());
            println!("Isolation: {}", cfg.queue.isolation.display_name());
            println!();

            println!("Categories:");
            for (name, category) in &cfg.queue.categories {
                let timeout = match cfg.queue.timeout_for(category) {
                    Some(t) => format!("{}s", t.as_secs()),
                    None => "none".to_string(),
                };
                let pending = match cfg.queue.max_pending_for(category) {
                    Some(n) => n.to_string(),
                    None => "unbounded".to_string(),
                };
                let command = if category.is_builtin() {
                    if desterra_workers::BUILTIN_CATEGORIES.contains(&name.as_str()) {
                        "built-in".to_string()
                    } else {
                        "built-in (unsupported, set `command`)".to_string()
                    }
                } else {
                    category.command.join(" ")
                };
                println!(
                    "  {name}: limit {} | timeout {timeout} | max pending {pending} | {command}",
                    category.limit
                );
            }
            println!();

            match cfg.channel.console {
                Some(ref c) if c.enabled => println!("  console: enabled"),
                Some(_) => println!("  console: disabled"),
                None => println!("  console: not configured"),
            }
        }
        Commands::Enqueue {
            category,
            text,
            file,
            json,
            out,
        } => {
            let cfg = config::load(&cli.config)?;
            let _log_guard = init_logging(&cfg.desterra.log_level, None)?;

            let payload = build_payload(&category, text, file.as_deref(), json.as_deref())?;
            let dispatcher = build_dispatcher(&cfg)?;
            let outcome = dispatcher.enqueue(&category, payload).await;
            dispatcher.shutdown().await;

            let value = outcome?;
            print_result(value, out.unwrap_or_else(|| cfg.outbox_dir()))?;
        }
        Commands::Worker { category } => {
            init_logging("info", None)?;
            desterra_workers::run(&category, std::io::stdin().lock(), std::io::stdout().lock())?;
        }
    }

    Ok(())
}

/// Install the tracing subscriber: stderr always, plus a daily rolling file
/// when `log_dir` is given. Keep the returned guard alive to flush the file.
fn init_logging(
    level: &str,
    log_dir: Option<&Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let stderr = fmt::layer().with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "desterra.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            Ok(None)
        }
    }
}

/// Dispatcher running every category as a process of this executable or of
/// the configured command.
fn build_dispatcher(cfg: &config::Config) -> anyhow::Result<Dispatcher> {
    let exe = std::env::current_exe()?;
    let spawner = ProcessSpawner::from_config(&cfg.queue, &exe);
    Ok(Dispatcher::from_config(
        &cfg.queue,
        Arc::new(spawner),
        cfg.scratch_root(),
    ))
}

/// Remove scratch directories left behind by a previous run.
fn purge_scratch(root: &Path) {
    let Ok(entries) = std::fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            match std::fs::remove_dir_all(&path) {
                Ok(()) => info!("removed stale scratch dir {}", path.display()),
                Err(e) => warn!("failed to remove stale scratch dir {}: {e}", path.display()),
            }
        }
    }
}

/// Payload field that carries `--text` for a category.
fn text_field(category: &str) -> &'static str {
    match category {
        "image" => "prompt",
        "music" => "query",
        _ => "text",
    }
}

fn build_payload(
    category: &str,
    text: Option<String>,
    file: Option<&Path>,
    json: Option<&str>,
) -> anyhow::Result<Value> {
    let mut payload = match json {
        Some(raw) => serde_json::from_str::<Value>(raw)?,
        None => Value::Object(Default::default()),
    };
    let Some(obj) = payload.as_object_mut() else {
        anyhow::bail!("--json must be a JSON object");
    };

    if let Some(text) = text {
        obj.insert(text_field(category).to_string(), Value::String(text));
    }
    if let Some(path) = file {
        let data = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let mimetype = desterra_core::media::mimetype_for_extension(ext);
        let media = serde_json::to_value(Media::new(mimetype, data).to_payload())?;
        if let Value::Object(fields) = media {
            obj.extend(fields);
        }
    }
    Ok(payload)
}

/// Print a job result. Media is written to disk instead of the terminal.
fn print_result(mut value: Value, out: PathBuf) -> anyhow::Result<()> {
    if let Ok(media) = Media::from_value(&value) {
        let path = if out.is_dir() || out.extension().is_none() {
            std::fs::create_dir_all(&out)?;
            out.join(format!("{}.{}", uuid::Uuid::new_v4(), media.extension()))
        } else {
            out
        };
        std::fs::write(&path, &media.data)?;
        value["media"] = Value::String(format!(
            "<{} bytes written to {}>",
            media.data.len(),
            path.display()
        ));
    }
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
