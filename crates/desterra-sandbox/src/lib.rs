//! # desterra-sandbox
//!
//! OS-level filesystem isolation for worker processes.
//!
//! Provides [`isolated_command`] which wraps a worker program in
//! platform-native write restrictions. Writes are allowed only to the job's
//! scratch directory, `/tmp` and the `/dev` nodes a process needs.
//!
//! - **macOS**: Apple Seatbelt via `sandbox-exec -p <profile>`
//! - **Linux**: Landlock LSM via `pre_exec` hook (kernel 5.13+)
//! - **Other**: Falls back to a plain command with a warning

use desterra_core::config::IsolationMode;
use std::path::Path;
use tokio::process::Command;

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
use tracing::warn;

#[cfg(target_os = "macos")]
mod seatbelt;

#[cfg(target_os = "linux")]
mod landlock_sandbox;

/// Build a [`Command`] for a worker process according to the isolation mode.
///
/// - `Open` → plain `Command::new(program)` (no restrictions)
/// - `Scratch` → platform-specific write restrictions (writes only to
///   `scratch_dir`, `/tmp` and `/dev`)
///
/// On unsupported platforms, logs a warning and returns a plain command.
pub fn isolated_command(program: &str, mode: IsolationMode, scratch_dir: &Path) -> Command {
    match mode {
        IsolationMode::Open => Command::new(program),
        IsolationMode::Scratch => platform_command(program, scratch_dir),
    }
}

/// Dispatch to the platform-specific sandbox implementation.
#[cfg(target_os = "macos")]
fn platform_command(program: &str, scratch_dir: &Path) -> Command {
    seatbelt::sandboxed_command(program, scratch_dir)
}

/// Dispatch to the platform-specific sandbox implementation.
#[cfg(target_os = "linux")]
fn platform_command(program: &str, scratch_dir: &Path) -> Command {
    landlock_sandbox::sandboxed_command(program, scratch_dir)
}

/// Fallback for unsupported platforms.
#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn platform_command(program: &str, _scratch_dir: &Path) -> Command {
    warn!("OS-level isolation not available on this platform; worker runs unrestricted");
    Command::new(program)
}
