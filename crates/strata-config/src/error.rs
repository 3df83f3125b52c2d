//! Error types for the configuration resolution pipeline
//!
//! Every failure carries the full dotted section/key path of the offending
//! item so problems are diagnosable from the error alone, without re-running
//! under extra logging. Binding is all-or-nothing: no error here is ever
//! recovered into a partial configuration.

use thiserror::Error;

/// Main error type for configuration loading and binding
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A source could not be used for merging
    #[error("Source `{name}`: {reason}")]
    Source {
        name: String,
        reason: String,
    },

    /// A schema was declared inconsistently (unknown parent, duplicate field)
    #[error("Schema `{name}`: {reason}")]
    Schema {
        name: String,
        reason: String,
    },

    /// A placeholder referenced a key or environment variable that does not exist
    #[error("Unresolved reference `{reference}` at {path}")]
    UnresolvedReference {
        reference: String,
        path: String,
    },

    /// Placeholder expansion found a self-referential chain
    #[error("Cyclic reference: {cycle}")]
    CyclicReference {
        cycle: String,
    },

    /// A raw value does not match the declared shape
    #[error("Cannot coerce {path}: expected {expected}, got `{raw}`: {reason}")]
    Coercion {
        path: String,
        expected: String,
        raw: String,
        reason: String,
    },

    /// A required field had no value and no default
    #[error("Missing required field {path}")]
    MissingRequiredField {
        path: String,
    },

    /// The secret backend had no entry for the locator
    #[error("Secret for {path} not found ({backend} locator `{locator}`)")]
    SecretNotFound {
        path: String,
        backend: String,
        locator: String,
    },

    /// The secret backend itself failed
    #[error("Secret backend `{backend}` failed for {path}: {reason}")]
    SecretBackend {
        path: String,
        backend: String,
        reason: String,
    },
}

impl ConfigError {
    /// Create a source error
    pub fn source(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Source {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a schema declaration error
    pub fn schema(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Schema {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an unresolved reference error
    pub fn unresolved(reference: impl Into<String>, path: impl Into<String>) -> Self {
        ConfigError::UnresolvedReference {
            reference: reference.into(),
            path: path.into(),
        }
    }

    /// Create a cyclic reference error
    pub fn cyclic(cycle: impl Into<String>) -> Self {
        ConfigError::CyclicReference {
            cycle: cycle.into(),
        }
    }

    /// Create a coercion error
    pub fn coercion(
        expected: impl Into<String>,
        raw: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConfigError::Coercion {
            path: String::new(),
            expected: expected.into(),
            raw: raw.into(),
            reason: reason.into(),
        }
    }

    /// Create a missing required field error
    pub fn missing_required(path: impl Into<String>) -> Self {
        ConfigError::MissingRequiredField { path: path.into() }
    }

    /// Attach a field path to errors raised below the binder.
    ///
    /// Coercion errors are built without knowing which field asked for the
    /// coercion; the binder decorates them on the way out. Errors that
    /// already carry a path keep it.
    pub fn at_path(self, field_path: &str) -> Self {
        match self {
            ConfigError::Coercion {
                path,
                expected,
                raw,
                reason,
            } if path.is_empty() => ConfigError::Coercion {
                path: field_path.to_string(),
                expected,
                raw,
                reason,
            },
            other => other,
        }
    }

    /// The dotted path this error points at, when it carries one
    pub fn path(&self) -> Option<&str> {
        match self {
            ConfigError::UnresolvedReference { path, .. }
            | ConfigError::Coercion { path, .. }
            | ConfigError::MissingRequiredField { path }
            | ConfigError::SecretNotFound { path, .. }
            | ConfigError::SecretBackend { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, ConfigError>;
