use anyhow::Result;
use host_probe::HostFacts;
use tracing::info;

use crate::config::{InstallLayout, NodeConfig};
use crate::installer::{InstallerStep, Stage};
use crate::prompt::Prompter;
use crate::summary;

pub struct ConfirmationStep<'a> {
    config: &'a NodeConfig,
    layout: &'a InstallLayout,
    facts: &'a HostFacts,
    prompter: &'a dyn Prompter,
    assume_yes: bool,
}

impl<'a> ConfirmationStep<'a> {
    pub fn new(
        config: &'a NodeConfig,
        layout: &'a InstallLayout,
        facts: &'a HostFacts,
        prompter: &'a dyn Prompter,
        assume_yes: bool,
    ) -> Self {
        Self {
            config,
            layout,
            facts,
            prompter,
            assume_yes,
        }
    }
}

impl InstallerStep for ConfirmationStep<'_> {
    type Output = ();
    const STAGE: Stage = Stage::Configuration;

    async fn execute(&self) -> Result<()> {
        summary::print_configuration(self.config, self.layout, self.facts);

        if self.assume_yes || !self.prompter.is_interactive() {
            return Ok(());
        }

        if !self.prompter.confirm("Are you ready to proceed?")? {
            return Err(anyhow::anyhow!("Installation cancelled by user"));
        }

        info!("✓ Installation confirmed");
        Ok(())
    }
}
