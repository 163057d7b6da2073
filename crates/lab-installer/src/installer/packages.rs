use anyhow::{Context, Result};
use host_probe::{CommandRunner, Invocation};
use tracing::{info, warn};

use crate::installer::{InstallerStep, Stage};

/// Runtime, toolchain, microcontroller flashing, JTAG and media tools.
pub const CORE_PACKAGES: &[&str] = &[
    "python3",
    "python3-pip",
    "python3-venv",
    "python3-dev",
    "git",
    "build-essential",
    "python3-flask",
    "python3-requests",
    "python3-psutil",
    "python3-serial",
    "python3-dotenv",
    "python3-lgpio",
    "avrdude",
    "esptool",
    "dfu-util",
    "openocd",
    "gdb-multiarch",
    "ffmpeg",
];

/// Audio capture libraries. The node runs without them.
pub const AUDIO_PACKAGES: &[&str] = &["alsa-utils", "portaudio19-dev", "python3-pyaudio"];

pub struct PackagesStep<'a> {
    runner: &'a dyn CommandRunner,
}

impl InstallerStep for PackagesStep<'_> {
    type Output = ();
    const STAGE: Stage = Stage::Packages;

    async fn execute(&self) -> Result<()> {
        info!("Step 2: Installing system packages...");

        self.apt(&["update"])
            .await
            .context("Failed to update package index")?;

        self.apt_install(CORE_PACKAGES)
            .await
            .context("Failed to install required packages")?;

        if let Err(e) = self.apt_install(AUDIO_PACKAGES).await {
            warn!("Audio packages could not be installed; audio capture will be unavailable: {:#}", e);
        }

        info!("✓ System packages installed");
        Ok(())
    }
}

impl<'a> PackagesStep<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    async fn apt_install(&self, packages: &[&str]) -> Result<()> {
        info!("Installing {}", packages.join(" "));
        let mut args = vec!["install", "-y"];
        args.extend_from_slice(packages);
        self.apt(&args).await
    }

    async fn apt(&self, args: &[&str]) -> Result<()> {
        let invocation = Invocation::new("apt-get", args.iter().copied())
            .env("DEBIAN_FRONTEND", "noninteractive")
            .streamed();
        self.runner.run_checked(&invocation).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use host_probe::testing::ScriptedRunner;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[tokio::test]
    async fn updates_index_before_installing() {
        let runner = ScriptedRunner::new();
        assert_ok!(PackagesStep::new(&runner).execute().await);

        let lines = runner.command_lines();
        assert_eq!(lines[0], "apt-get update");
        assert!(lines[1].starts_with("apt-get install -y python3 "));
        assert!(lines[1].contains(" avrdude "));
        assert!(lines[1].contains(" openocd "));
        assert_eq!(
            lines[2],
            "apt-get install -y alsa-utils portaudio19-dev python3-pyaudio"
        );
        assert!(runner.invocations().iter().all(|i| {
            i.envs
                .contains(&("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string()))
        }));
    }

    #[tokio::test]
    async fn core_install_failure_is_fatal() {
        let runner = ScriptedRunner::new().fail("install -y python3 ", 100, "");
        let err = assert_err!(PackagesStep::new(&runner).execute().await);

        assert!(err.to_string().contains("required packages"));
        assert!(!runner.ran("portaudio19-dev"));
    }

    #[tokio::test]
    async fn update_failure_stops_before_install() {
        let runner = ScriptedRunner::new().fail("apt-get update", 100, "");
        assert_err!(PackagesStep::new(&runner).execute().await);
        assert_eq!(runner.command_lines(), ["apt-get update"]);
    }

    #[tokio::test]
    async fn audio_failure_is_only_a_warning() {
        let runner = ScriptedRunner::new().fail("portaudio19-dev", 100, "");
        assert_ok!(PackagesStep::new(&runner).execute().await);
    }
}
