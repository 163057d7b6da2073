use anyhow::{Context, Result};
use host_probe::{CommandOutput, CommandRunner, Invocation};
use tracing::{info, warn};

use crate::config::InstallLayout;
use crate::installer::{InstallerStep, Stage};

const DEFAULT_MAINLINE: &str = "origin/main";

/// How the working tree was brought up to date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Cloned,
    Pulled,
    /// The tree could not fast-forward and was hard-reset to the remote mainline.
    ResetToRemote {
        mainline: String,
        discarded_head: Option<String>,
    },
}

pub struct SourceSyncStep<'a> {
    runner: &'a dyn CommandRunner,
    layout: &'a InstallLayout,
}

impl InstallerStep for SourceSyncStep<'_> {
    type Output = SyncOutcome;
    const STAGE: Stage = Stage::SourceSync;

    async fn execute(&self) -> Result<SyncOutcome> {
        info!("Step 3: Synchronizing application source...");

        let outcome = if tokio::fs::try_exists(self.layout.git_dir()).await.unwrap_or(false) {
            self.update().await?
        } else {
            self.clone_repository().await?
        };

        info!("✓ Source at {} is up to date", self.layout.project_dir.display());
        Ok(outcome)
    }
}

impl<'a> SourceSyncStep<'a> {
    pub fn new(runner: &'a dyn CommandRunner, layout: &'a InstallLayout) -> Self {
        Self { runner, layout }
    }

    async fn clone_repository(&self) -> Result<SyncOutcome> {
        let target = &self.layout.project_dir;
        info!("Cloning {} into {}", self.layout.repo_url, target.display());

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let target = target.to_string_lossy();
        self.git(["clone", self.layout.repo_url.as_str(), &*target], true)
            .await
            .with_context(|| format!("Failed to clone {}", self.layout.repo_url))?;

        Ok(SyncOutcome::Cloned)
    }

    async fn update(&self) -> Result<SyncOutcome> {
        info!("Existing checkout found, pulling latest changes...");

        // Fails on any divergence, whatever pull.rebase says
        match self.git_in_tree(["pull", "--ff-only"], true).await {
            Ok(_) => Ok(SyncOutcome::Pulled),
            Err(e) => {
                warn!("git pull could not fast-forward: {:#}", e);
                self.reset_to_remote().await
            }
        }
    }

    /// Discard local history and match the remote's default branch.
    async fn reset_to_remote(&self) -> Result<SyncOutcome> {
        let discarded_head = self
            .git_in_tree(["rev-parse", "--short", "HEAD"], false)
            .await
            .ok()
            .map(|output| output.stdout_trimmed().to_string())
            .filter(|head| !head.is_empty());

        self.git_in_tree(["fetch", "origin"], true)
            .await
            .context("Failed to fetch from origin")?;

        let mainline = self
            .git_in_tree(["symbolic-ref", "--short", "refs/remotes/origin/HEAD"], false)
            .await
            .ok()
            .map(|output| output.stdout_trimmed().to_string())
            .filter(|branch| !branch.is_empty())
            .unwrap_or_else(|| DEFAULT_MAINLINE.to_string());

        warn!(
            "Resetting {} to {}; local commits and uncommitted changes{} are discarded",
            self.layout.project_dir.display(),
            mainline,
            discarded_head
                .as_deref()
                .map(|head| format!(" (previous HEAD {})", head))
                .unwrap_or_default()
        );

        self.git_in_tree(["reset", "--hard", mainline.as_str()], true)
            .await
            .with_context(|| format!("Failed to reset to {}", mainline))?;

        Ok(SyncOutcome::ResetToRemote {
            mainline,
            discarded_head,
        })
    }

    async fn git_in_tree<const N: usize>(&self, args: [&str; N], stream: bool) -> Result<CommandOutput> {
        let dir = self.layout.project_dir.to_string_lossy();
        let mut full = vec!["-C", &*dir];
        full.extend_from_slice(&args);
        self.git(full, stream).await
    }

    /// Run git as the target user so the checkout stays owned by them.
    async fn git<'s>(&self, args: impl IntoIterator<Item = &'s str>, stream: bool) -> Result<CommandOutput> {
        let mut invocation = Invocation::new("git", args);
        if stream {
            invocation = invocation.streamed();
        }
        if self.layout.user != "root" {
            invocation = invocation.as_user(&self.layout.user);
        }

        Ok(self.runner.run_checked(&invocation).await?)
    }
}
