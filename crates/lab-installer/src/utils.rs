use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use host_probe::{CommandRunner, Invocation};
use tokio::fs;
use tracing::debug;

/// Run a systemctl command, failing on a non-zero exit.
pub async fn systemctl_command(runner: &dyn CommandRunner, args: &[&str]) -> Result<()> {
    runner
        .run_checked(&Invocation::new("systemctl", args.iter().copied()))
        .await
        .with_context(|| format!("Failed to run systemctl {:?}", args))?;
    Ok(())
}

/// Ask systemd for `is-enabled` / `is-active` style state of a unit.
pub async fn systemctl_query(runner: &dyn CommandRunner, verb: &str, unit: &str) -> Result<String> {
    let output = runner
        .run(&Invocation::new("systemctl", [verb, unit]))
        .await
        .with_context(|| format!("Failed to run systemctl {} {}", verb, unit))?;

    let state = output.stdout_trimmed();
    Ok(if state.is_empty() { "unknown".to_string() } else { state.to_string() })
}

/// Write content to a file, creating parent directories if needed
pub async fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .context("Failed to create parent directories")?;
    }

    fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write file: {}", path.display()))?;

    debug!("Wrote file: {}", path.display());
    Ok(())
}

/// Sibling path a file is staged at before being renamed into place.
pub fn staging_path(path: &Path) -> PathBuf {
    sibling(path, ".labpi-new")
}

/// Sibling path the replaced file is kept at until the new one is final.
pub fn backup_path(path: &Path) -> PathBuf {
    sibling(path, ".labpi-old")
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// A file written next to its destination, not yet visible under its real name.
#[derive(Debug)]
pub struct StagedFile {
    staged: PathBuf,
    target: PathBuf,
}

impl StagedFile {
    pub async fn write(target: &Path, content: &str, mode: Option<u32>) -> Result<Self> {
        let staged = staging_path(target);
        write_file(&staged, content).await?;
        if let Some(mode) = mode {
            set_mode(&staged, mode).await?;
        }

        Ok(Self {
            staged,
            target: target.to_path_buf(),
        })
    }

    pub async fn set_owner(&self, uid: u32, gid: u32) -> Result<()> {
        set_owner(&self.staged, uid, gid).await
    }

    pub async fn commit(self) -> Result<PathBuf> {
        if let Err(e) = fs::rename(&self.staged, &self.target).await {
            remove_quietly(&self.staged).await;
            return Err(e).with_context(|| format!("Failed to move {} into place", self.target.display()));
        }
        debug!("Committed {}", self.target.display());
        Ok(self.target)
    }

    /// Move into place, keeping the file it replaces until [`Replaced::keep`].
    pub async fn commit_replacing(self) -> Result<Replaced> {
        let backup = backup_path(&self.target);
        let backup = if fs::try_exists(&self.target).await.unwrap_or(false) {
            if let Err(e) = fs::rename(&self.target, &backup).await {
                remove_quietly(&self.staged).await;
                return Err(e).with_context(|| format!("Failed to back up {}", self.target.display()));
            }
            Some(backup)
        } else {
            None
        };

        let target = self.target.clone();
        match self.commit().await {
            Ok(target) => Ok(Replaced { target, backup }),
            Err(e) => {
                if let Some(backup) = &backup {
                    if let Err(restore) = fs::rename(backup, &target).await {
                        debug!("Could not restore {}: {}", target.display(), restore);
                    }
                }
                Err(e)
            }
        }
    }

    pub async fn discard(self) {
        remove_quietly(&self.staged).await;
    }
}

/// A committed file whose previous version can still be put back.
#[derive(Debug)]
pub struct Replaced {
    target: PathBuf,
    backup: Option<PathBuf>,
}

impl Replaced {
    /// Drop the previous version.
    pub async fn keep(self) {
        if let Some(backup) = &self.backup {
            remove_quietly(backup).await;
        }
    }

    /// Put the previous version back, or remove the file if there was none.
    pub async fn restore(self) -> Result<()> {
        match &self.backup {
            Some(backup) => fs::rename(backup, &self.target)
                .await
                .with_context(|| format!("Failed to restore {}", self.target.display()))?,
            None => fs::remove_file(&self.target)
                .await
                .with_context(|| format!("Failed to remove {}", self.target.display()))?,
        }
        debug!("Restored previous {}", self.target.display());
        Ok(())
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        debug!("Could not remove {}: {}", path.display(), e);
    }
}

pub async fn set_owner(path: &Path, uid: u32, gid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || std::os::unix::fs::chown(&owned, Some(uid), Some(gid)))
            .await
            .context("Ownership change was cancelled")?
            .with_context(|| format!("Failed to change owner of {}", path.display()))?;
    }

    debug!("Set owner {}:{} on {}", uid, gid, path.display());
    Ok(())
}

pub async fn set_mode(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(mode);
        fs::set_permissions(path, permissions)
            .await
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }

    debug!("Set mode {:o} on {}", mode, path.display());
    Ok(())
}
