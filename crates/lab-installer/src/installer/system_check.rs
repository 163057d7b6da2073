use anyhow::{Context, Result};
use host_probe::account::effective_uid;
use host_probe::{CommandRunner, HostFacts, command_exists};
use tracing::{info, warn};

use crate::config::{AnswerFile, InstallLayout, InstallOptions, LayoutOverrides};
use crate::installer::{InstallerStep, Stage};
use crate::resolve::EnvSnapshot;

/// What preflight learned about the machine.
#[derive(Debug, Clone)]
pub struct Preflight {
    pub facts: HostFacts,
    pub layout: InstallLayout,
}

pub struct SystemCheckStep<'a> {
    runner: &'a dyn CommandRunner,
    env: &'a EnvSnapshot,
    answers: &'a AnswerFile,
    overrides: &'a LayoutOverrides,
    options: &'a InstallOptions,
}

impl InstallerStep for SystemCheckStep<'_> {
    type Output = Preflight;
    const STAGE: Stage = Stage::Preflight;

    async fn execute(&self) -> Result<Preflight> {
        info!("Step 0: Checking system requirements...");

        self.check_root().await?;
        self.check_tools().await?;

        let layout = InstallLayout::resolve(self.runner, self.env, self.answers, self.overrides).await?;
        if layout.user == "root" {
            warn!("Installing for root; run through sudo from the lab account to provision that account instead");
        }

        let facts = HostFacts::gather(&layout.host_root, self.runner).await;
        info!(
            "Host {} ({}, {})",
            facts.hostname, facts.architecture, facts.platform
        );

        info!("✓ System check completed");
        Ok(Preflight { facts, layout })
    }
}

impl<'a> SystemCheckStep<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        env: &'a EnvSnapshot,
        answers: &'a AnswerFile,
        overrides: &'a LayoutOverrides,
        options: &'a InstallOptions,
    ) -> Self {
        Self {
            runner,
            env,
            answers,
            overrides,
            options,
        }
    }

    async fn check_root(&self) -> Result<()> {
        let uid = effective_uid(self.runner)
            .await
            .context("Failed to determine effective user id")?;

        if uid != 0 {
            return Err(anyhow::anyhow!(
                "This installer must run as root (uid {}); re-run it with sudo",
                uid
            ));
        }

        info!("Running as root ✓");
        Ok(())
    }

    async fn check_tools(&self) -> Result<()> {
        let mut required = vec!["git", "systemctl", "usermod"];
        if !self.options.skip_packages {
            required.push("apt-get");
        }

        let mut missing = Vec::new();
        for tool in required {
            if command_exists(self.runner, tool).await? {
                info!("{} found ✓", tool);
            } else {
                missing.push(tool);
            }
        }

        if !missing.is_empty() {
            return Err(anyhow::anyhow!(
                "Required tools not found on PATH: {}",
                missing.join(", ")
            ));
        }

        Ok(())
    }
}
