use std::io;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use thiserror::Error;
use wdesk_platform::InstallTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStep {
    Stage,
    MarkExecutable,
    MoveAside,
    Replace,
}

impl std::fmt::Display for SwapStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Stage => "stage update",
            Self::MarkExecutable => "mark update executable",
            Self::MoveAside => "move current executable aside",
            Self::Replace => "move update into place",
        })
    }
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("update does not contain {}", .path.display())]
    MissingArtifact { path: PathBuf },
    #[error("failed to {step} ({}): {source}", .path.display())]
    Step {
        step: SwapStep,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(
        "failed rollback of {}: {rollback_error} (replace failed with: {swap_error}); previous version left at {}",
        .executable.display(),
        .backup.display()
    )]
    RollbackFailed {
        executable: PathBuf,
        backup: PathBuf,
        staged: PathBuf,
        swap_error: io::Error,
        #[source]
        rollback_error: io::Error,
    },
}

impl ApplyError {
    fn step(step: SwapStep, path: &Path, source: io::Error) -> Self {
        Self::Step {
            step,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Filesystem primitives used by the swap.
pub trait FileOps: Send + Sync {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn copy_recursive(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn set_executable(&self, path: &Path) -> io::Result<()>;
    fn remove_all(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileOps;

impl FileOps for StdFileOps {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn copy_recursive(&self, from: &Path, to: &Path) -> io::Result<()> {
        if !from.is_dir() {
            std::fs::copy(from, to)?;
            return Ok(());
        }

        std::fs::create_dir_all(to)?;
        for entry in std::fs::read_dir(from)? {
            let entry = entry?;
            self.copy_recursive(&entry.path(), &to.join(entry.file_name()))?;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn set_executable(&self, path: &Path) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
    }

    #[cfg(not(unix))]
    fn set_executable(&self, path: &Path) -> io::Result<()> {
        std::fs::metadata(path).map(|_| ())
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        if std::fs::symlink_metadata(path)?.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        }
    }
}

/// Replace the live executable (or bundle) described by `target` with the
/// entry of the same name in `extracted_dir`.
///
/// The swap goes through the siblings `.<name>.new` and `.<name>.old`. When
/// the final rename fails the previous executable is renamed back. Both
/// siblings are removed afterwards unless the rollback itself failed, in which
/// case they are left for manual recovery.
///
/// Assumes no other process renames these paths concurrently.
///
/// # Errors
/// Returns [`ApplyError::RollbackFailed`] when the installation may be left
/// without a live executable, and [`ApplyError::Step`] for any other failure.
pub fn apply_update(
    ops: &dyn FileOps,
    target: &InstallTarget,
    extracted_dir: &Path,
) -> Result<(), ApplyError> {
    let staged = target.staged_path();
    let backup = target.backup_path();

    let outcome = swap(ops, target, extracted_dir, &staged, &backup);

    if !matches!(outcome, Err(ApplyError::RollbackFailed { .. })) {
        for path in [&backup, &staged] {
            remove_quietly(ops, path);
        }
    }

    outcome
}

fn swap(
    ops: &dyn FileOps,
    target: &InstallTarget,
    extracted_dir: &Path,
    staged: &Path,
    backup: &Path,
) -> Result<(), ApplyError> {
    let live = target.swap_path();
    let download = extracted_dir.join(target.swap_name());
    if std::fs::symlink_metadata(&download).is_err() {
        return Err(ApplyError::MissingArtifact { path: download });
    }

    remove_quietly(ops, staged);
    info!("Staging update at {}", staged.display());
    stage(ops, &download, staged).map_err(|error| ApplyError::step(SwapStep::Stage, staged, error))?;

    let binary = target.binary_within(staged);
    ops.set_executable(&binary)
        .map_err(|error| ApplyError::step(SwapStep::MarkExecutable, &binary, error))?;

    remove_quietly(ops, backup);
    debug!("Moving {} to {}", live.display(), backup.display());
    ops.rename(live, backup)
        .map_err(|error| ApplyError::step(SwapStep::MoveAside, live, error))?;

    if let Err(swap_error) = ops.rename(staged, live) {
        warn!(
            "Failed to move update into place, restoring {}: {swap_error}",
            live.display()
        );
        if let Err(rollback_error) = ops.rename(backup, live) {
            error!(
                "Rollback failed, {} is missing; previous version kept at {}: {rollback_error}",
                live.display(),
                backup.display()
            );
            return Err(ApplyError::RollbackFailed {
                executable: live.to_path_buf(),
                backup: backup.to_path_buf(),
                staged: staged.to_path_buf(),
                swap_error,
                rollback_error,
            });
        }
        return Err(ApplyError::step(SwapStep::Replace, live, swap_error));
    }

    info!("Update applied to {}", live.display());
    Ok(())
}

fn stage(ops: &dyn FileOps, from: &Path, to: &Path) -> io::Result<()> {
    if ops.rename(from, to).is_ok() {
        return Ok(());
    }

    debug!(
        "Rename of {} failed, copying instead",
        from.file_name().unwrap_or_default().to_string_lossy()
    );
    ops.copy_recursive(from, to)?;
    remove_quietly(ops, from);
    Ok(())
}

fn remove_quietly(ops: &dyn FileOps, path: &Path) {
    if let Err(error) = ops.remove_all(path)
        && error.kind() != io::ErrorKind::NotFound
    {
        debug!("Failed to remove {}: {error}", path.display());
    }
}
