use anyhow::Result;
use host_probe::CommandRunner;
use tracing::info;

use crate::config::InstallLayout;
use crate::installer::{InstallerStep, Stage};
use crate::utils::systemctl_command;

/// Registers the unit for boot. The service is not started here.
pub struct ServiceConfigStep<'a> {
    runner: &'a dyn CommandRunner,
    layout: &'a InstallLayout,
}

impl InstallerStep for ServiceConfigStep<'_> {
    type Output = ();
    const STAGE: Stage = Stage::Environment;

    async fn execute(&self) -> Result<()> {
        info!("Registering {} with systemd...", self.layout.unit_name());

        systemctl_command(self.runner, &["daemon-reload"]).await?;
        systemctl_command(self.runner, &["enable", self.layout.service_name.as_str()]).await?;

        info!("✓ Service {} enabled", self.layout.service_name);
        Ok(())
    }
}

impl<'a> ServiceConfigStep<'a> {
    pub fn new(runner: &'a dyn CommandRunner, layout: &'a InstallLayout) -> Self {
        Self { runner, layout }
    }
}
