//! Environment variable secret provider

use async_trait::async_trait;

use super::traits::{ProviderError, ProviderResult, SecretProvider};

/// Serves secrets from process environment variables. The locator is the
/// variable name.
#[derive(Debug, Default)]
pub struct EnvSecretProvider;

impl EnvSecretProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    fn name(&self) -> &str {
        "env"
    }

    async fn lookup(&self, locator: &str) -> ProviderResult<String> {
        match std::env::var(locator) {
            Ok(value) => Ok(value),
            Err(std::env::VarError::NotPresent) => Err(ProviderError::NotFound {
                locator: locator.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(ProviderError::Backend(format!(
                "environment variable `{locator}` is not valid unicode"
            ))),
        }
    }
}
