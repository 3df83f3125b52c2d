//! Interactive prompt secret provider
//!
//! Asks the operator for the secret at resolution time. The locator is the
//! label shown in the prompt (the dotted field path by default). Input is
//! abstracted behind [`PromptInput`] so tests never touch a real terminal.

use async_trait::async_trait;
use std::fmt::Debug;
use std::io::{BufRead, Write};

use super::traits::{ProviderError, ProviderResult, SecretProvider};

/// Where prompt answers come from
pub trait PromptInput: Send + Sync + Debug {
    /// Show `label` and return the entered value
    fn ask(&self, label: &str) -> std::io::Result<String>;
}

/// Reads answers from stdin, writing the prompt to stderr
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl PromptInput for StdinPrompt {
    fn ask(&self, label: &str) -> std::io::Result<String> {
        let mut stderr = std::io::stderr().lock();
        write!(stderr, "Secret for {label}: ")?;
        stderr.flush()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

#[derive(Debug)]
pub struct PromptSecretProvider {
    input: Box<dyn PromptInput>,
}

impl PromptSecretProvider {
    pub fn new() -> Self {
        Self {
            input: Box::new(StdinPrompt),
        }
    }

    pub fn with_input(input: Box<dyn PromptInput>) -> Self {
        Self { input }
    }
}

impl Default for PromptSecretProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretProvider for PromptSecretProvider {
    fn name(&self) -> &str {
        "prompt"
    }

    async fn lookup(&self, locator: &str) -> ProviderResult<String> {
        let answer = self
            .input
            .ask(locator)
            .map_err(|e| ProviderError::Backend(e.to_string()))?;
        if answer.is_empty() {
            return Err(ProviderError::NotFound {
                locator: locator.to_string(),
            });
        }
        Ok(answer)
    }
}
