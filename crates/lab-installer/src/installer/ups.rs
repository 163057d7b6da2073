use std::path::PathBuf;

use anyhow::Result;
use host_probe::{Architecture, CommandRunner, HostFacts, Invocation};
use tracing::{info, warn};

use crate::config::InstallLayout;
use crate::installer::{InstallerStep, Stage};

/// Architectures the UPS HAT driver is built for.
pub const UPS_ARCHITECTURES: [&str; 3] = ["aarch64", "armv7l", "armv6l"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsOutcome {
    Installed,
    /// Not a Raspberry Pi on a supported architecture.
    NotEligible(String),
    ScriptMissing(PathBuf),
    /// The installer script exited unsuccessfully; `None` if it was killed.
    Failed(Option<i32>),
    Disabled,
}

/// Runs the bundled UPS HAT installer on Raspberry Pi hardware.
///
/// Never fatal: a missing script or a failing installer is reported and the
/// pipeline carries on.
pub struct UpsDriverStep<'a> {
    runner: &'a dyn CommandRunner,
    facts: &'a HostFacts,
    layout: &'a InstallLayout,
}

impl InstallerStep for UpsDriverStep<'_> {
    type Output = UpsOutcome;
    const STAGE: Stage = Stage::UpsDriver;

    async fn execute(&self) -> Result<UpsOutcome> {
        info!("Step 6: Checking for UPS HAT support...");

        if let Some(reason) = self.ineligibility() {
            warn!("Skipping UPS driver: {}", reason);
            return Ok(UpsOutcome::NotEligible(reason));
        }

        let script = &self.layout.ups_script;
        if !tokio::fs::try_exists(script).await.unwrap_or(false) {
            warn!("UPS installer {} not found, skipping", script.display());
            return Ok(UpsOutcome::ScriptMissing(script.clone()));
        }

        info!("Running UPS installer {}", script.display());
        let invocation = Invocation::new("bash", [script.to_string_lossy().into_owned()])
            .env("SUDO_USER", &self.layout.user)
            .streamed();

        let outcome = match self.runner.run(&invocation).await {
            Ok(output) if output.success() => {
                info!("✓ UPS driver installed");
                UpsOutcome::Installed
            }
            Ok(output) => {
                warn!(
                    "UPS installer exited with {}; continuing without UPS support",
                    output
                        .code
                        .map(|code| format!("code {}", code))
                        .unwrap_or_else(|| "a signal".to_string())
                );
                UpsOutcome::Failed(output.code)
            }
            Err(e) => {
                warn!("UPS installer could not be started: {}", e);
                UpsOutcome::Failed(None)
            }
        };

        Ok(outcome)
    }
}

impl<'a> UpsDriverStep<'a> {
    pub fn new(runner: &'a dyn CommandRunner, facts: &'a HostFacts, layout: &'a InstallLayout) -> Self {
        Self {
            runner,
            facts,
            layout,
        }
    }

    fn ineligibility(&self) -> Option<String> {
        let arch = &self.facts.architecture;
        if !supports_ups(arch) {
            return Some(format!("unsupported architecture {}", arch));
        }
        if !self.facts.platform.is_raspberry_pi() {
            return Some(format!("not a Raspberry Pi ({})", self.facts.platform));
        }
        None
    }
}

/// Whether `arch` can run the UPS HAT driver at all.
pub fn supports_ups(arch: &Architecture) -> bool {
    UPS_ARCHITECTURES.contains(&arch.to_string().as_str())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use host_probe::Platform;
    use host_probe::testing::ScriptedRunner;
    use tracing_test::traced_test;

    use super::*;

    fn facts(arch: &str, model: &str) -> HostFacts {
        HostFacts {
            root: PathBuf::from("/"),
            hostname: "labpi".into(),
            architecture: Architecture::from_machine(arch),
            platform: Platform::from_model(model),
            link: None,
        }
    }

    fn layout_with_script(dir: &Path) -> InstallLayout {
        let layout = InstallLayout::for_user("pi", dir);
        std::fs::create_dir_all(layout.ups_script.parent().unwrap()).unwrap();
        std::fs::write(&layout.ups_script, "#!/bin/bash\n").unwrap();
        layout
    }

    #[tokio::test]
    #[traced_test]
    async fn skips_non_arm_hosts() {
        let home = tempfile::tempdir().unwrap();
        let layout = layout_with_script(home.path());
        let facts = facts("x86_64", "Raspberry Pi 4 Model B Rev 1.4");
        let runner = ScriptedRunner::new();

        let outcome = UpsDriverStep::new(&runner, &facts, &layout).execute().await.unwrap();

        assert!(matches!(outcome, UpsOutcome::NotEligible(_)));
        assert!(runner.command_lines().is_empty());
        logs_assert(|lines: &[&str]| {
            if lines
                .iter()
                .any(|line| line.contains("WARN") && line.contains("Skipping UPS driver"))
            {
                Ok(())
            } else {
                Err("ineligible host was not reported as a warning".to_string())
            }
        });
    }

    #[tokio::test]
    async fn skips_arm_boards_that_are_not_raspberry_pi() {
        let home = tempfile::tempdir().unwrap();
        let layout = layout_with_script(home.path());
        let facts = facts("aarch64", "Pine64 RockPro64");
        let runner = ScriptedRunner::new();

        let outcome = UpsDriverStep::new(&runner, &facts, &layout).execute().await.unwrap();

        assert!(matches!(outcome, UpsOutcome::NotEligible(_)));
        assert!(!runner.ran("bash"));
    }

    #[tokio::test]
    async fn runs_installer_on_raspberry_pi() {
        let home = tempfile::tempdir().unwrap();
        let layout = layout_with_script(home.path());
        let facts = facts("aarch64", "Raspberry Pi 5 Model B Rev 1.0");
        let runner = ScriptedRunner::new();

        let outcome = UpsDriverStep::new(&runner, &facts, &layout).execute().await.unwrap();

        assert_eq!(outcome, UpsOutcome::Installed);
        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(
            invocations[0].command_line(),
            format!("bash {}", layout.ups_script.display())
        );
        assert!(invocations[0]
            .envs
            .contains(&("SUDO_USER".to_string(), "pi".to_string())));
    }

    #[tokio::test]
    async fn missing_script_is_skipped() {
        let home = tempfile::tempdir().unwrap();
        let layout = InstallLayout::for_user("pi", home.path());
        let facts = facts("armv7l", "Raspberry Pi 3 Model B Plus Rev 1.3");
        let runner = ScriptedRunner::new();

        let outcome = UpsDriverStep::new(&runner, &facts, &layout).execute().await.unwrap();

        assert_eq!(outcome, UpsOutcome::ScriptMissing(layout.ups_script.clone()));
        assert!(runner.command_lines().is_empty());
    }

    #[tokio::test]
    async fn failing_installer_is_not_fatal() {
        let home = tempfile::tempdir().unwrap();
        let layout = layout_with_script(home.path());
        let facts = facts("armv6l", "Raspberry Pi Zero W Rev 1.1");
        let runner = ScriptedRunner::new().fail("bash", 3, "");

        let outcome = UpsDriverStep::new(&runner, &facts, &layout).execute().await.unwrap();

        assert_eq!(outcome, UpsOutcome::Failed(Some(3)));
    }

    #[test]
    fn only_arm_architectures_are_supported() {
        assert!(supports_ups(&Architecture::Aarch64));
        assert!(supports_ups(&Architecture::Armv6l));
        assert!(!supports_ups(&Architecture::X64));
    }
}
