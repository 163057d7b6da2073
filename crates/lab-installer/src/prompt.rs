use anyhow::Result;
use dialoguer::{Confirm, Input, Password};

use crate::resolve::Field;

/// Supplies values the environment and answers file left open.
pub trait Prompter {
    fn is_interactive(&self) -> bool;

    /// Ask for `field`, offering `default` when it is non-empty.
    fn ask(&self, field: Field, default: &str) -> Result<String>;

    fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Prompts the operator on the terminal.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn is_interactive(&self) -> bool {
        true
    }

    fn ask(&self, field: Field, default: &str) -> Result<String> {
        if field.is_secret() {
            let value = Password::new()
                .with_prompt(field.label())
                .allow_empty_password(true)
                .interact()?;
            return Ok(if value.is_empty() { default.to_string() } else { value });
        }

        let mut input = Input::<String>::new()
            .with_prompt(field.label())
            .allow_empty(true);
        if !default.is_empty() {
            input = input.default(default.to_string());
        }

        Ok(input.interact_text()?)
    }

    fn confirm(&self, prompt: &str) -> Result<bool> {
        Ok(Confirm::new().with_prompt(prompt).default(true).interact()?)
    }
}

/// Takes every default without asking; used for `--yes` and without a TTY.
pub struct AcceptDefaults;

impl Prompter for AcceptDefaults {
    fn is_interactive(&self) -> bool {
        false
    }

    fn ask(&self, _field: Field, default: &str) -> Result<String> {
        Ok(default.to_string())
    }

    fn confirm(&self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}
