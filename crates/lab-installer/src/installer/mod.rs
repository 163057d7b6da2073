use anyhow::Result;
use host_probe::CommandRunner;
use strum::{Display, EnumIter};
use thiserror::Error;
use tracing::info;

mod configuration;
mod confirmation;
mod environment;
mod packages;
mod permissions;
mod service_config;
mod source_sync;
mod system_check;
mod ups;
mod verify;

pub use configuration::ConfigurationStep;
pub use confirmation::ConfirmationStep;
pub use environment::EnvironmentStep;
pub use packages::{AUDIO_PACKAGES, CORE_PACKAGES, PackagesStep};
pub use permissions::{GroupChange, HARDWARE_GROUPS, PermissionsStep};
pub use service_config::ServiceConfigStep;
pub use source_sync::{SourceSyncStep, SyncOutcome};
pub use system_check::{Preflight, SystemCheckStep};
pub use ups::{UPS_ARCHITECTURES, UpsDriverStep, UpsOutcome};
pub use verify::VerificationStep;

use crate::config::{AnswerFile, InstallLayout, InstallOptions, LayoutOverrides, NodeConfig};
use crate::prompt::Prompter;
use crate::resolve::EnvSnapshot;
use crate::summary;

/// Pipeline stages, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum Stage {
    #[strum(to_string = "preflight")]
    Preflight,
    #[strum(to_string = "configuration")]
    Configuration,
    #[strum(to_string = "system packages")]
    Packages,
    #[strum(to_string = "source sync")]
    SourceSync,
    #[strum(to_string = "environment")]
    Environment,
    #[strum(to_string = "permissions")]
    Permissions,
    #[strum(to_string = "UPS driver")]
    UpsDriver,
    #[strum(to_string = "verification")]
    Verification,
}

/// A fatal failure, tagged with the stage it happened in.
#[derive(Error, Debug)]
#[error("{stage} stage failed")]
pub struct InstallError {
    pub stage: Stage,
    #[source]
    pub source: anyhow::Error,
}

pub(crate) trait InstallerStep {
    type Output;
    const STAGE: Stage;

    async fn execute(&self) -> Result<Self::Output>;
}

async fn run_step<S: InstallerStep>(step: S) -> Result<S::Output, InstallError> {
    step.execute().await.map_err(|source| InstallError {
        stage: S::STAGE,
        source,
    })
}

/// What a successful run did.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub config: NodeConfig,
    pub layout: InstallLayout,
    pub sync: SyncOutcome,
    pub groups: Vec<(String, GroupChange)>,
    pub ups: UpsOutcome,
}

pub struct Installer<'a> {
    runner: &'a dyn CommandRunner,
    prompter: &'a dyn Prompter,
    env: EnvSnapshot,
    answers: AnswerFile,
    overrides: LayoutOverrides,
    options: InstallOptions,
}

impl<'a> Installer<'a> {
    pub fn new(runner: &'a dyn CommandRunner, prompter: &'a dyn Prompter) -> Self {
        Self {
            runner,
            prompter,
            env: EnvSnapshot::default(),
            answers: AnswerFile::default(),
            overrides: LayoutOverrides::default(),
            options: InstallOptions::default(),
        }
    }

    pub fn with_env(mut self, env: EnvSnapshot) -> Self {
        self.env = env;
        self
    }

    pub fn with_answers(mut self, answers: AnswerFile) -> Self {
        self.answers = answers;
        self
    }

    pub fn with_overrides(mut self, overrides: LayoutOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_options(mut self, options: InstallOptions) -> Self {
        self.options = options;
        self
    }

    /// Run every stage in order, stopping at the first fatal error.
    pub async fn install(&self) -> Result<InstallReport, InstallError> {
        info!("Starting Lab Pi installation...");

        // Step 0: Check privileges and tools, detect the host
        let Preflight { facts, layout } = run_step(SystemCheckStep::new(
            self.runner,
            &self.env,
            &self.answers,
            &self.overrides,
            &self.options,
        ))
        .await?;

        // Step 1: Gather configuration
        let config = run_step(ConfigurationStep::new(
            &self.env,
            &self.answers,
            &facts,
            self.prompter,
            self.options.strict,
        ))
        .await?;

        // Step 1b: Show the summary and confirm
        run_step(ConfirmationStep::new(
            &config,
            &layout,
            &facts,
            self.prompter,
            self.options.assume_yes,
        ))
        .await?;

        // Step 2: Install system packages
        if self.options.skip_packages {
            info!("Skipping system packages (--skip-packages)");
        } else {
            run_step(PackagesStep::new(self.runner)).await?;
        }

        // Step 3: Synchronize the application source
        let sync = run_step(SourceSyncStep::new(self.runner, &layout)).await?;

        // Step 4: Write the environment file and unit, then register the unit
        run_step(EnvironmentStep::new(self.runner, &config, &layout)).await?;
        run_step(ServiceConfigStep::new(self.runner, &layout)).await?;

        // Step 5: Hardware group membership
        let groups = run_step(PermissionsStep::new(self.runner, &layout.user)).await?;

        // Step 6: Optional UPS driver
        let ups = if self.options.skip_ups {
            info!("Skipping UPS driver installer (--skip-ups)");
            UpsOutcome::Disabled
        } else {
            run_step(UpsDriverStep::new(self.runner, &facts, &layout)).await?
        };

        // Step 7: Verify installation
        run_step(VerificationStep::new(self.runner, &layout)).await?;

        let report = InstallReport {
            config,
            layout,
            sync,
            groups,
            ups,
        };

        info!("Lab Pi installation completed successfully!");
        summary::print_final_summary(&report);

        Ok(report)
    }
}
