use std::fmt;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

pub mod account;
pub mod host;
pub mod network;
pub mod utils;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use host::HostFacts;
pub use utils::{architecture::Architecture, platform::Platform};

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed with exit code {code}: {stderr}")]
    NonZeroExit {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("{0} terminated by signal")]
    TerminatedBySignal(String),
}

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("Unexpected output from {command}: {output}")]
    UnexpectedOutput { command: String, output: String },
}

/// A single external command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    /// Stream stdout/stderr to the terminal instead of capturing them.
    pub stream: bool,
}

impl Invocation {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            envs: Vec::new(),
            stream: false,
        }
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.envs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn streamed(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Wrap this invocation so it runs as `user` through sudo.
    pub fn as_user(self, user: &str) -> Self {
        let mut args = vec![
            "-u".to_string(),
            user.to_string(),
            "-H".to_string(),
            self.program,
        ];
        args.extend(self.args);
        Self {
            program: "sudo".to_string(),
            args,
            envs: self.envs,
            stream: self.stream,
        }
    }

    /// Program and arguments joined by spaces, used for logs and test matching.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.command_line())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the invocation to completion. A non-zero exit is not an error here.
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ExecutionError>;

    /// Run the invocation and turn a non-zero exit into an error.
    async fn run_checked(&self, invocation: &Invocation) -> Result<CommandOutput, ExecutionError> {
        let output = self.run(invocation).await?;
        match output.code {
            Some(0) => Ok(output),
            Some(code) => Err(ExecutionError::NonZeroExit {
                command: invocation.command_line(),
                code,
                stderr: output.stderr.trim().to_string(),
            }),
            None => Err(ExecutionError::TerminatedBySignal(invocation.command_line())),
        }
    }
}

/// Runs commands on the real system with `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ExecutionError> {
        debug!("Executing {}", invocation);

        let mut command = tokio::process::Command::new(&invocation.program);
        command.args(&invocation.args);
        for (key, value) in &invocation.envs {
            command.env(key, value);
        }

        if invocation.stream {
            let status = command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .await
                .map_err(|source| ExecutionError::Spawn {
                    program: invocation.program.clone(),
                    source,
                })?;

            return Ok(CommandOutput {
                code: status.code(),
                ..CommandOutput::default()
            });
        }

        let output = command
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ExecutionError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Check whether a program can be found on `PATH`.
pub async fn command_exists(runner: &dyn CommandRunner, program: &str) -> Result<bool, ExecutionError> {
    let output = runner.run(&Invocation::new("which", [program])).await?;
    Ok(output.success())
}
