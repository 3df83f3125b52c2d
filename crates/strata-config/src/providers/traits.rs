//! Secret provider trait and error types

use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

/// Errors a secret backend can report
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The backend has no entry for the locator
    #[error("No secret for locator `{locator}`")]
    NotFound { locator: String },

    /// The backend itself failed
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type alias for provider operations
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// A backend that turns a locator into secret plaintext.
///
/// Implementations are looked up by [`SecretSource`](crate::SecretSource) in
/// the resolver; one provider instance may serve many handles concurrently.
#[async_trait]
pub trait SecretProvider: Send + Sync + Debug {
    /// Provider name for diagnostics
    fn name(&self) -> &str;

    /// Fetch the plaintext for a locator
    async fn lookup(&self, locator: &str) -> ProviderResult<String>;
}
