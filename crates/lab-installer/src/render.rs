//! Rendering of the environment file and the systemd unit.
//!
//! Both artifacts are pure functions of [`NodeConfig`] and [`InstallLayout`]:
//! no timestamps, no lookups, so re-rendering the same inputs gives the same
//! bytes.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::path::PathBuf;

use strum::Display;

use crate::config::{InstallLayout, NodeConfig, PYTHON_INTERPRETER, RESTART_DELAY_SECS};

/// Value of the node type marker the application checks on startup.
pub const NODE_TYPE: &str = "lab";

/// Key/value pairs of the environment file, in file order.
pub fn env_entries(config: &NodeConfig) -> Vec<(&'static str, String)> {
    vec![
        ("VLAB_PI_TYPE", NODE_TYPE.to_string()),
        ("VLAB_PI_ID", config.identity.id.clone()),
        ("VLAB_PI_NAME", config.identity.name.clone()),
        ("VLAB_PI_MAC", config.identity.mac.clone()),
        ("EXPERIMENT_ID", config.experiment.experiment_id.clone()),
        ("MASTER_URL", config.master.url.clone()),
        ("MASTER_API_KEY", config.master.api_key.clone()),
        ("VLAB_PI_LOCATION", config.identity.location.clone()),
        ("LAB_PORT", config.server.port.to_string()),
        ("LAB_HOST", config.server.host.clone()),
        (
            "LAB_DEBUG",
            if config.server.debug { "True" } else { "False" }.to_string(),
        ),
    ]
}

/// Quote a value when systemd or python-dotenv would otherwise misread it.
fn quote_env_value(value: &str) -> Cow<'_, str> {
    let needs_quotes = value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\'' | '\\' | '$' | '`'));
    if !needs_quotes {
        return Cow::Borrowed(value);
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' | '\\' | '$' | '`' => {
                quoted.push('\\');
                quoted.push(c);
            }
            '\n' => quoted.push_str("\\n"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    Cow::Owned(quoted)
}

pub fn render_env_file(config: &NodeConfig) -> String {
    let mut out = String::from(
        "# Virtual Lab - Lab Pi configuration\n\
         # Generated by labpi-setup. Re-running the installer overwrites this file.\n",
    );
    for (key, value) in env_entries(config) {
        let _ = writeln!(out, "{}={}", key, quote_env_value(&value));
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RestartPolicy {
    #[strum(to_string = "always")]
    Always,
}

/// How systemd runs, restarts and logs the node application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub description: String,
    pub user: String,
    pub working_directory: PathBuf,
    pub environment_file: PathBuf,
    pub interpreter: PathBuf,
    pub entry_point: PathBuf,
    pub restart: RestartPolicy,
    pub restart_delay_secs: u64,
    pub log_path: PathBuf,
    pub environment: Vec<(String, String)>,
}

impl ServiceDescriptor {
    pub fn new(config: &NodeConfig, layout: &InstallLayout) -> Self {
        Self {
            description: format!("Virtual Lab - Lab Pi node {}", config.identity.id),
            user: layout.user.clone(),
            working_directory: layout.project_dir.clone(),
            environment_file: layout.env_file(),
            interpreter: PathBuf::from(PYTHON_INTERPRETER),
            entry_point: layout.entry_point(),
            restart: RestartPolicy::Always,
            restart_delay_secs: RESTART_DELAY_SECS,
            log_path: layout.log_path.clone(),
            environment: vec![("PYTHONUNBUFFERED".to_string(), "1".to_string())],
        }
    }

    pub fn exec_start(&self) -> String {
        format!(
            "{} {}",
            self.interpreter.display(),
            self.entry_point.display()
        )
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "[Unit]");
        let _ = writeln!(out, "Description={}", self.description);
        let _ = writeln!(out, "After=network-online.target");
        let _ = writeln!(out, "Wants=network-online.target");
        let _ = writeln!(out);
        let _ = writeln!(out, "[Service]");
        let _ = writeln!(out, "Type=simple");
        let _ = writeln!(out, "User={}", self.user);
        let _ = writeln!(out, "WorkingDirectory={}", self.working_directory.display());
        let _ = writeln!(out, "EnvironmentFile={}", self.environment_file.display());
        let _ = writeln!(out, "ExecStart={}", self.exec_start());
        let _ = writeln!(out, "Restart={}", self.restart);
        let _ = writeln!(out, "RestartSec={}", self.restart_delay_secs);
        let _ = writeln!(out, "StandardOutput=append:{}", self.log_path.display());
        let _ = writeln!(out, "StandardError=append:{}", self.log_path.display());
        for (key, value) in &self.environment {
            let _ = writeln!(out, "Environment={}={}", key, value);
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "[Install]");
        let _ = writeln!(out, "WantedBy=multi-user.target");
        out
    }
}

/// The two files written by the environment stage, always rendered together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub env_file: String,
    pub unit: String,
}

impl Artifacts {
    pub fn render(config: &NodeConfig, layout: &InstallLayout) -> Self {
        Self {
            env_file: render_env_file(config),
            unit: ServiceDescriptor::new(config, layout).render(),
        }
    }
}
