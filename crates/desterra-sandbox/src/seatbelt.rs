//! macOS Seatbelt (sandbox-exec) enforcement.
//!
//! Wraps a worker with `sandbox-exec -p <profile>` so it can only write to
//! its scratch directory and the system temp locations.

use std::path::Path;
use tokio::process::Command;
use tracing::warn;

/// Path to the sandbox-exec binary (built into macOS).
const SANDBOX_EXEC: &str = "/usr/bin/sandbox-exec";

/// Generate a Seatbelt profile that allows everything except file writes
/// outside the scratch directory and temp locations.
fn build_profile(scratch_dir: &Path) -> String {
    let scratch = scratch_dir.display();

    format!(
        r#"(version 1)
(allow default)
(deny file-write*)
(allow file-write*
  (subpath "{scratch}")
  (subpath "/private/tmp")
  (subpath "/private/var/folders")
  (literal "/dev/null")
  (literal "/dev/zero")
  (subpath "/dev/fd")
)"#
    )
}

/// Build a [`Command`] wrapped with `sandbox-exec` write restrictions.
///
/// If `/usr/bin/sandbox-exec` does not exist, logs a warning and returns
/// a plain command without OS-level enforcement.
pub(crate) fn sandboxed_command(program: &str, scratch_dir: &Path) -> Command {
    if !Path::new(SANDBOX_EXEC).exists() {
        warn!("sandbox-exec not found at {SANDBOX_EXEC}; worker runs unrestricted");
        return Command::new(program);
    }

    let profile = build_profile(scratch_dir);
    let mut cmd = Command::new(SANDBOX_EXEC);
    cmd.arg("-p").arg(profile).arg("--").arg(program);
    cmd
}
