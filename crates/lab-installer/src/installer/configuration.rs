use anyhow::Result;
use host_probe::HostFacts;
use tracing::info;

use crate::config::{AnswerFile, NodeConfig};
use crate::installer::{InstallerStep, Stage};
use crate::prompt::Prompter;
use crate::resolve::{EnvSnapshot, Resolver};

pub struct ConfigurationStep<'a> {
    env: &'a EnvSnapshot,
    answers: &'a AnswerFile,
    facts: &'a HostFacts,
    prompter: &'a dyn Prompter,
    strict: bool,
}

impl InstallerStep for ConfigurationStep<'_> {
    type Output = NodeConfig;
    const STAGE: Stage = Stage::Configuration;

    async fn execute(&self) -> Result<NodeConfig> {
        info!("Step 1: Gathering Lab Pi configuration...");

        let config = Resolver::new(self.env, self.answers, self.facts).resolve(self.prompter)?;
        config.check_required(self.strict)?;

        info!("✓ Configuration gathered");
        Ok(config)
    }
}

impl<'a> ConfigurationStep<'a> {
    pub fn new(
        env: &'a EnvSnapshot,
        answers: &'a AnswerFile,
        facts: &'a HostFacts,
        prompter: &'a dyn Prompter,
        strict: bool,
    ) -> Self {
        Self {
            env,
            answers,
            facts,
            prompter,
            strict,
        }
    }
}
