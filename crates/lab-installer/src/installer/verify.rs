use anyhow::Result;
use host_probe::CommandRunner;
use tracing::{info, warn};

use crate::config::InstallLayout;
use crate::installer::{InstallerStep, Stage};
use crate::utils::systemctl_query;

pub struct VerificationStep<'a> {
    runner: &'a dyn CommandRunner,
    layout: &'a InstallLayout,
}

impl InstallerStep for VerificationStep<'_> {
    type Output = ();
    const STAGE: Stage = Stage::Verification;

    async fn execute(&self) -> Result<()> {
        info!("Step 7: Verifying installation...");

        self.check_files().await?;
        self.check_service().await?;

        info!("✓ Installation verification completed");
        Ok(())
    }
}

impl<'a> VerificationStep<'a> {
    pub fn new(runner: &'a dyn CommandRunner, layout: &'a InstallLayout) -> Self {
        Self { runner, layout }
    }

    async fn check_files(&self) -> Result<()> {
        for path in [self.layout.env_file(), self.layout.unit_path()] {
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Err(anyhow::anyhow!("{} is missing after installation", path.display()));
            }
            info!("{} present ✓", path.display());
        }

        if !tokio::fs::try_exists(self.layout.entry_point()).await.unwrap_or(false) {
            warn!(
                "{} not found; the service will fail to start until it exists",
                self.layout.entry_point().display()
            );
        }

        Ok(())
    }

    async fn check_service(&self) -> Result<()> {
        let service = self.layout.service_name.as_str();

        let enabled = systemctl_query(self.runner, "is-enabled", service).await?;
        if enabled == "enabled" {
            info!("Service {} is enabled ✓", service);
        } else {
            warn!("Service {} is not enabled ({})", service, enabled);
        }

        let active = systemctl_query(self.runner, "is-active", service).await?;
        info!("Service {} is currently {}", service, active);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use host_probe::testing::ScriptedRunner;

    use super::*;

    fn layout(root: &Path) -> InstallLayout {
        let mut layout = InstallLayout::for_user("pi", &root.join("home/pi"));
        layout.unit_dir = root.join("units");
        layout
    }

    #[tokio::test]
    async fn missing_unit_fails_verification() {
        let root = tempfile::tempdir().unwrap();
        let layout = layout(root.path());
        std::fs::create_dir_all(&layout.project_dir).unwrap();
        std::fs::write(layout.env_file(), "VLAB_PI_TYPE=lab\n").unwrap();
        let runner = ScriptedRunner::new();

        let err = VerificationStep::new(&runner, &layout).execute().await.unwrap_err();

        assert!(err.to_string().contains("vlab-lab-pi.service is missing"));
        assert!(!runner.ran("systemctl"));
    }

    #[tokio::test]
    async fn disabled_unit_is_only_a_warning() {
        let root = tempfile::tempdir().unwrap();
        let layout = layout(root.path());
        std::fs::create_dir_all(&layout.project_dir).unwrap();
        std::fs::create_dir_all(&layout.unit_dir).unwrap();
        std::fs::write(layout.env_file(), "VLAB_PI_TYPE=lab\n").unwrap();
        std::fs::write(layout.unit_path(), "[Unit]\n").unwrap();
        let runner = ScriptedRunner::new()
            .fail("is-enabled", 1, "")
            .respond("is-active", "inactive\n");

        VerificationStep::new(&runner, &layout).execute().await.unwrap();

        assert_eq!(
            runner.command_lines(),
            [
                "systemctl is-enabled vlab-lab-pi",
                "systemctl is-active vlab-lab-pi"
            ]
        );
    }
}
