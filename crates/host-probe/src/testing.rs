//! A scripted [`CommandRunner`] for tests.
//!
//! Every invocation is recorded. The first rule whose pattern is a substring of
//! the command line decides the output; unmatched commands succeed with empty
//! output.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::{CommandOutput, CommandRunner, ExecutionError, Invocation};

#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Vec<(String, CommandOutput)>,
    log: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Succeed with `stdout` for commands containing `pattern`.
    pub fn respond(mut self, pattern: &str, stdout: &str) -> Self {
        self.rules.push((
            pattern.to_string(),
            CommandOutput {
                code: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        ));
        self
    }

    /// Exit with `code` and `stderr` for commands containing `pattern`.
    pub fn fail(mut self, pattern: &str, code: i32, stderr: &str) -> Self {
        self.rules.push((
            pattern.to_string(),
            CommandOutput {
                code: Some(code),
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        ));
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.invocations().iter().map(Invocation::command_line).collect()
    }

    /// Whether any recorded command line contains `pattern`.
    pub fn ran(&self, pattern: &str) -> bool {
        self.command_lines().iter().any(|line| line.contains(pattern))
    }

    /// Index of the first recorded command line containing `pattern`.
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.command_lines().iter().position(|line| line.contains(pattern))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ExecutionError> {
        let line = invocation.command_line();
        if let Ok(mut log) = self.log.lock() {
            log.push(invocation.clone());
        }

        let output = self
            .rules
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or(CommandOutput {
                code: Some(0),
                ..CommandOutput::default()
            });

        Ok(output)
    }
}
