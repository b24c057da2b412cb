//! Linux Landlock LSM enforcement.
//!
//! Uses the `landlock` crate to restrict file writes in the worker process
//! via a `pre_exec` hook. Requires Linux kernel 5.13+ with Landlock enabled;
//! older kernels run the worker with best-effort (possibly no) enforcement.

use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::warn;

use landlock::{
    path_beneath_rules, Access, AccessFs, BitFlags, Ruleset, RulesetAttr, RulesetCreatedAttr,
    RulesetStatus, ABI,
};

/// All read-related filesystem access flags.
fn read_access() -> BitFlags<AccessFs> {
    AccessFs::ReadFile | AccessFs::ReadDir | AccessFs::Execute | AccessFs::Refer
}

/// All filesystem access flags (read + write).
fn full_access() -> BitFlags<AccessFs> {
    AccessFs::from_all(ABI::V5)
}

/// Build a [`Command`] with Landlock write restrictions applied via `pre_exec`.
///
/// The worker will be allowed to:
/// - Read and execute from the entire filesystem (`/`)
/// - Read, write, and create files in `scratch_dir`, `/tmp` and `/dev`
pub(crate) fn sandboxed_command(program: &str, scratch_dir: &Path) -> Command {
    let scratch_dir = scratch_dir.to_path_buf();
    let mut cmd = Command::new(program);

    // SAFETY: pre_exec runs in the forked child before exec. We only call
    // the landlock crate (which uses syscalls), no async or allocator abuse.
    unsafe {
        cmd.pre_exec(move || {
            apply_landlock(&scratch_dir).map_err(|e| {
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, e.to_string())
            })
        });
    }

    cmd
}

/// Apply Landlock restrictions to the current process.
fn apply_landlock(scratch_dir: &Path) -> Result<(), anyhow::Error> {
    let status = Ruleset::default()
        .handle_access(full_access())?
        .create()?
        // Read + execute on entire filesystem.
        .add_rules(path_beneath_rules(&[PathBuf::from("/")], read_access()))?
        // Full access to the job's own scratch directory.
        .add_rules(path_beneath_rules(&[scratch_dir], full_access()))?
        .add_rules(path_beneath_rules(&[PathBuf::from("/tmp")], full_access()))?
        // /dev/null, /dev/urandom, ...
        .add_rules(path_beneath_rules(&[PathBuf::from("/dev")], full_access()))?
        .restrict_self()?;

    if status.ruleset != RulesetStatus::FullyEnforced {
        warn!(
            "landlock: not all restrictions enforced (kernel may lack full support); \
             best-effort isolation active"
        );
    }

    Ok(())
}
