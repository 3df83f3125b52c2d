//! Lazy secret handles and resolution
//!
//! Binding never fetches a secret. A secret field binds to a [`SecretHandle`]
//! carrying the backend discriminator and locator; the plaintext is fetched on
//! first [`SecretHandle::resolve`] through a [`SecretResolver`] and cached so
//! the backend is consulted at most once per handle. Failed lookups are not
//! cached and are retried on the next call.
//!
//! Handles never reveal plaintext through `Debug`, so a logged configuration
//! cannot leak credentials.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::error::{ConfigError, Result};
use crate::providers::traits::{ProviderError, SecretProvider};

/// Which backend serves a secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretSource {
    /// The configuration value itself is the secret
    Inline,
    /// Environment variable named by the locator
    Env,
    /// External secret store keyed by the locator
    Store,
    /// Interactive prompt
    Prompt,
}

impl fmt::Display for SecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecretSource::Inline => "inline",
            SecretSource::Env => "env",
            SecretSource::Store => "store",
            SecretSource::Prompt => "prompt",
        };
        write!(f, "{name}")
    }
}

impl FromStr for SecretSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inline" => Ok(SecretSource::Inline),
            "env" => Ok(SecretSource::Env),
            "store" => Ok(SecretSource::Store),
            "prompt" => Ok(SecretSource::Prompt),
            other => Err(format!("unknown secret source `{other}`")),
        }
    }
}

#[derive(Debug)]
struct HandleInner {
    source: SecretSource,
    locator: String,
    path: String,
    cache: OnceCell<String>,
}

/// A lazily resolved secret bound to a configuration field.
///
/// Cloning a handle shares the cache; every clone sees the same at-most-once
/// resolution.
#[derive(Clone)]
pub struct SecretHandle {
    inner: Arc<HandleInner>,
}

impl SecretHandle {
    pub(crate) fn new(
        source: SecretSource,
        locator: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                source,
                locator: locator.into(),
                path: path.into(),
                cache: OnceCell::new(),
            }),
        }
    }

    pub fn source(&self) -> SecretSource {
        self.inner.source
    }

    /// The backend locator (a key name, an env var name, a prompt label)
    pub fn locator(&self) -> &str {
        &self.inner.locator
    }

    /// Dotted path of the field this handle was bound for
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Fetch the plaintext, consulting the backend only on the first call.
    pub async fn resolve(&self, resolver: &SecretResolver) -> Result<&str> {
        let value = self
            .inner
            .cache
            .get_or_try_init(|| resolver.fetch(self))
            .await?;
        Ok(value.as_str())
    }

    /// Whether the plaintext has already been fetched
    pub fn is_resolved(&self) -> bool {
        self.inner.cache.initialized()
    }
}

impl fmt::Debug for SecretHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretHandle")
            .field("source", &self.inner.source)
            .field("locator", &self.inner.locator)
            .field("path", &self.inner.path)
            .field("value", &"********")
            .finish()
    }
}

/// Dispatches secret handles to their backing providers.
///
/// Providers are injected explicitly; there is no ambient registry. A handle
/// whose source has no provider fails with a backend error.
#[derive(Debug, Default)]
pub struct SecretResolver {
    providers: HashMap<SecretSource, Arc<dyn SecretProvider>>,
}

impl SecretResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(
        mut self,
        source: SecretSource,
        provider: Arc<dyn SecretProvider>,
    ) -> Self {
        self.providers.insert(source, provider);
        self
    }

    /// Resolve a handle through this resolver. Equivalent to
    /// [`SecretHandle::resolve`]; the handle's cache still applies.
    pub async fn resolve(&self, handle: &SecretHandle) -> Result<String> {
        Ok(handle.resolve(self).await?.to_string())
    }

    async fn fetch(&self, handle: &SecretHandle) -> Result<String> {
        let source = handle.source();
        let provider = self.providers.get(&source).ok_or_else(|| {
            ConfigError::SecretBackend {
                path: handle.path().to_string(),
                backend: source.to_string(),
                reason: "no provider configured for this source".to_string(),
            }
        })?;
        tracing::debug!(
            path = handle.path(),
            source = %source,
            provider = provider.name(),
            "Resolving secret"
        );
        match provider.lookup(handle.locator()).await {
            Ok(value) => Ok(value),
            Err(ProviderError::NotFound { locator }) => Err(ConfigError::SecretNotFound {
                path: handle.path().to_string(),
                backend: source.to_string(),
                locator,
            }),
            Err(other) => Err(ConfigError::SecretBackend {
                path: handle.path().to_string(),
                backend: source.to_string(),
                reason: other.to_string(),
            }),
        }
    }
}
