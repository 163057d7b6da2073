use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use host_probe::CommandRunner;
use host_probe::account::{home_dir, invoking_user};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::resolve::{EnvSnapshot, REPO_URL_VAR};

pub const DEFAULT_MASTER_URL: &str = "http://192.168.1.5:5000";
pub const DEFAULT_REPO_URL: &str = "https://github.com/vlab-project/virtual-lab.git";
pub const SERVICE_NAME: &str = "vlab-lab-pi";
pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";
pub const DEFAULT_LOG_PATH: &str = "/var/log/vlab-lab-pi.log";
pub const PROJECT_DIR_NAME: &str = "virtual-lab";
pub const ENV_FILE_NAME: &str = ".env";
pub const ENTRY_POINT: &str = "lab_pi_app.py";
pub const PYTHON_INTERPRETER: &str = "/usr/bin/python3";
pub const UPS_SCRIPT: &str = "ups/install_ups.sh";
/// Seconds systemd waits before restarting the node application.
pub const RESTART_DELAY_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read answers file {path}: {source}")]
    ReadAnswers {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid answers file {path}: {source}")]
    ParseAnswers {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{0} is required but empty")]
    MissingRequired(&'static str),

    #[error("experiment id must be an integer, got {0:?}")]
    InvalidExperimentId(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub id: String,
    pub name: String,
    /// Empty when unknown.
    pub mac: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentBinding {
    pub experiment_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterEndpoint {
    pub url: String,
    pub api_key: String,
}

/// Where the node application listens. Not operator-configurable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerBinding {
    pub host: String,
    pub port: u16,
    pub debug: bool,
}

impl Default for ServerBinding {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            debug: false,
        }
    }
}

/// Everything the environment file and the unit are rendered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub identity: NodeIdentity,
    pub experiment: ExperimentBinding,
    pub master: MasterEndpoint,
    pub server: ServerBinding,
}

impl NodeConfig {
    /// Check the fields the node cannot run without.
    ///
    /// The node application reads `EXPERIMENT_ID` as an integer. Empty or
    /// non-numeric values are written through as-is unless `strict` is set.
    pub fn check_required(&self, strict: bool) -> Result<(), ConfigError> {
        let required = [
            ("node id", self.identity.id.as_str()),
            ("experiment id", self.experiment.experiment_id.as_str()),
        ];

        for (name, value) in required {
            if value.trim().is_empty() {
                if strict {
                    return Err(ConfigError::MissingRequired(name));
                }
                warn!("{} is empty; it will be written as an empty value", name);
            }
        }

        let experiment_id = self.experiment.experiment_id.trim();
        if !experiment_id.is_empty() && experiment_id.parse::<i64>().is_err() {
            if strict {
                return Err(ConfigError::InvalidExperimentId(experiment_id.to_string()));
            }
            warn!(
                "experiment id {:?} is not an integer; the node application will not start with it",
                experiment_id
            );
        }

        Ok(())
    }
}

/// Paths and names the installation is laid out with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    /// Account the service runs as and that receives hardware groups.
    pub user: String,
    pub project_dir: PathBuf,
    pub repo_url: String,
    pub unit_dir: PathBuf,
    pub service_name: String,
    pub log_path: PathBuf,
    /// Filesystem root host facts are read from.
    pub host_root: PathBuf,
    pub ups_script: PathBuf,
}

impl InstallLayout {
    pub fn for_user(user: &str, home: &Path) -> Self {
        let project_dir = home.join(PROJECT_DIR_NAME);
        Self {
            user: user.to_string(),
            ups_script: project_dir.join(UPS_SCRIPT),
            project_dir,
            repo_url: DEFAULT_REPO_URL.to_string(),
            unit_dir: PathBuf::from(DEFAULT_UNIT_DIR),
            service_name: SERVICE_NAME.to_string(),
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            host_root: PathBuf::from("/"),
        }
    }

    pub fn env_file(&self) -> PathBuf {
        self.project_dir.join(ENV_FILE_NAME)
    }

    pub fn entry_point(&self) -> PathBuf {
        self.project_dir.join(ENTRY_POINT)
    }

    pub fn unit_name(&self) -> String {
        format!("{}.service", self.service_name)
    }

    pub fn unit_path(&self) -> PathBuf {
        self.unit_dir.join(self.unit_name())
    }

    pub fn git_dir(&self) -> PathBuf {
        self.project_dir.join(".git")
    }
}

/// Command-line overrides applied on top of the computed layout.
#[derive(Debug, Clone, Default)]
pub struct LayoutOverrides {
    pub user: Option<String>,
    pub project_dir: Option<PathBuf>,
    pub repo_url: Option<String>,
    pub ups_script: Option<PathBuf>,
    pub unit_dir: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    pub host_root: Option<PathBuf>,
}

impl InstallLayout {
    /// Work out the layout for this run.
    ///
    /// The target user is `--user`, else the sudo caller; the repository URL
    /// is `--repo-url`, else `VLAB_REPO_URL`, else the answers file.
    pub async fn resolve(
        runner: &dyn CommandRunner,
        env: &EnvSnapshot,
        answers: &AnswerFile,
        overrides: &LayoutOverrides,
    ) -> Result<Self> {
        let user = overrides
            .user
            .clone()
            .unwrap_or_else(|| invoking_user(env.get("SUDO_USER"), env.get("USER")));

        let home = match home_dir(runner, &user)
            .await
            .with_context(|| format!("Failed to look up home directory of {}", user))?
        {
            Some(home) => home,
            None if user == "root" => PathBuf::from("/root"),
            None => PathBuf::from("/home").join(&user),
        };
        debug!("Provisioning for user {} (home {})", user, home.display());

        let mut layout = Self::for_user(&user, &home);

        if let Some(project_dir) = &overrides.project_dir {
            layout.ups_script = project_dir.join(UPS_SCRIPT);
            layout.project_dir = project_dir.clone();
        }
        if let Some(repo_url) = overrides
            .repo_url
            .clone()
            .or_else(|| env.get(REPO_URL_VAR).map(str::to_string))
            .or_else(|| answers.repo_url.clone().filter(|url| !url.trim().is_empty()))
        {
            layout.repo_url = repo_url;
        }
        if let Some(ups_script) = &overrides.ups_script {
            layout.ups_script = ups_script.clone();
        }
        if let Some(unit_dir) = &overrides.unit_dir {
            layout.unit_dir = unit_dir.clone();
        }
        if let Some(log_path) = &overrides.log_path {
            layout.log_path = log_path.clone();
        }
        if let Some(host_root) = &overrides.host_root {
            layout.host_root = host_root.clone();
        }

        Ok(layout)
    }
}

/// Switches that change how the pipeline runs, not what it writes.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Never prompt; accept computed defaults and skip confirmation.
    pub assume_yes: bool,
    pub skip_packages: bool,
    pub skip_ups: bool,
    /// Reject empty required fields instead of writing them through.
    pub strict: bool,
}

/// Pre-answered values for unattended provisioning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnswerFile {
    pub node_id: Option<String>,
    pub node_name: Option<String>,
    pub mac: Option<String>,
    pub experiment_id: Option<String>,
    pub master_url: Option<String>,
    pub master_api_key: Option<String>,
    pub location: Option<String>,
    pub repo_url: Option<String>,
}

impl AnswerFile {
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::ReadAnswers {
                path: path.to_path_buf(),
                source,
            })?;

        let answers = Self::parse(&content).map_err(|source| ConfigError::ParseAnswers {
            path: path.to_path_buf(),
            source,
        })?;

        info!("Loaded answers from {}", path.display());
        Ok(answers)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
