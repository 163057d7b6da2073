use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use host_probe::CommandRunner;
use serde::Serialize;
use tracing::debug;

use crate::config::InstallLayout;
use crate::summary::mask_secret;
use crate::utils::systemctl_query;

const SECRET_KEYS: [&str; 1] = ["MASTER_API_KEY"];

/// State of an existing installation, as found on disk and in systemd.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallStatus {
    pub env_file: PathBuf,
    pub env_file_present: bool,
    /// Env file entries, secrets masked.
    pub environment: BTreeMap<String, String>,
    pub unit_file: PathBuf,
    pub unit_file_present: bool,
    pub enabled: String,
    pub active: String,
}

impl InstallStatus {
    pub async fn collect(runner: &dyn CommandRunner, layout: &InstallLayout) -> Result<Self> {
        let env_file = layout.env_file();
        let unit_file = layout.unit_path();

        let env_file_present = tokio::fs::try_exists(&env_file).await.unwrap_or(false);
        let environment = if env_file_present {
            read_env_file(&env_file)?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            env_file_present,
            environment,
            unit_file_present: tokio::fs::try_exists(&unit_file).await.unwrap_or(false),
            enabled: systemctl_query(runner, "is-enabled", &layout.service_name).await?,
            active: systemctl_query(runner, "is-active", &layout.service_name).await?,
            env_file,
            unit_file,
        })
    }

    pub fn is_installed(&self) -> bool {
        self.env_file_present && self.unit_file_present
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize status")
    }

    pub fn print(&self) {
        if self.is_installed() {
            println!("Lab Pi node is installed");
        } else {
            println!("Lab Pi node is not installed");
        }
        println!(
            " Environment file:    {} ({})",
            self.env_file.display(),
            presence(self.env_file_present)
        );
        println!(
            " Service unit:        {} ({})",
            self.unit_file.display(),
            presence(self.unit_file_present)
        );
        println!(" Enabled:             {}", self.enabled);
        println!(" Active:              {}", self.active);

        if !self.environment.is_empty() {
            println!();
            for (key, value) in &self.environment {
                println!(" {:<20} {}", key, value);
            }
        }
    }
}

fn presence(present: bool) -> &'static str {
    if present { "present" } else { "missing" }
}

/// Parse an env file without exporting it into this process.
// from_path_iter is the only dotenv entry point that leaves the environment alone
#[allow(deprecated)]
fn read_env_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut entries = BTreeMap::new();
    let iter = dotenv::from_path_iter(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    for item in iter {
        let (key, value) = item.with_context(|| format!("Failed to parse {}", path.display()))?;
        let value = if SECRET_KEYS.contains(&key.as_str()) {
            mask_secret(&value)
        } else {
            value
        };
        entries.insert(key, value);
    }

    debug!("Read {} entries from {}", entries.len(), path.display());
    Ok(entries)
}
