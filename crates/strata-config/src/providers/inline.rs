//! Inline secret provider
//!
//! The locator is the plaintext itself: the secret was written directly in a
//! configuration source. Useful for local development; a warning is logged on
//! every lookup because the value lives unprotected in config.

use async_trait::async_trait;

use super::traits::{ProviderError, ProviderResult, SecretProvider};

#[derive(Debug, Default)]
pub struct InlineSecretProvider;

impl InlineSecretProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SecretProvider for InlineSecretProvider {
    fn name(&self) -> &str {
        "inline"
    }

    async fn lookup(&self, locator: &str) -> ProviderResult<String> {
        if locator.is_empty() {
            return Err(ProviderError::NotFound {
                locator: locator.to_string(),
            });
        }
        tracing::warn!("Secret read from an inline configuration value");
        Ok(locator.to_string())
    }
}
