//! Secret backends
//!
//! Each provider turns a locator into plaintext for one
//! [`SecretSource`](crate::SecretSource). Providers are registered on a
//! [`SecretResolver`](crate::SecretResolver); nothing here runs during
//! binding.

pub mod env;
pub mod inline;
pub mod prompt;
pub mod traits;

pub use env::EnvSecretProvider;
pub use inline::InlineSecretProvider;
pub use prompt::{PromptInput, PromptSecretProvider, StdinPrompt};
pub use traits::{ProviderError, ProviderResult, SecretProvider};
