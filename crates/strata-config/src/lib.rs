//! Layered configuration resolution for services
//!
//! strata-config merges named configuration sources in priority order,
//! expands `${...}` placeholders, coerces raw strings into declared shapes,
//! and binds the result against a schema. Secret-bearing fields bind to lazy
//! handles that consult a pluggable backend at most once, on first use.
//!
//! # Architecture
//!
//! ```text
//! Sources ──merge──> RawTree ──expand──> RawTree ──bind──> BoundConfig
//!    (priority order)      (placeholders)      (schema + coercion)
//!                                                      │
//!                                             SecretHandle ──resolve──> plaintext
//!                                                  (lazy, via SecretResolver)
//! ```
//!
//! The pipeline itself is synchronous; only secret resolution is async,
//! because backends may do I/O.
//!
//! # Example
//!
//! ```no_run
//! use strata_config::{
//!     load, FieldSpec, Schema, Shape, Source,
//! };
//!
//! # fn main() -> strata_config::Result<()> {
//! let defaults = Source::new("defaults").with_value("db", "port", "5432");
//! let site = Source::new("site").with_value("db", "host", "db.internal");
//!
//! let schema = Schema::new("app").with_section(
//!     "db",
//!     Schema::new("db")
//!         .with_field("host", FieldSpec::required(Shape::Str))
//!         .with_field("port", FieldSpec::with_default(Shape::Int, "5432")),
//! );
//!
//! let config = load(&[defaults, site], &schema)?;
//! assert_eq!(config.get_value("db.port").unwrap().as_int(), Some(5432));
//! # Ok(())
//! # }
//! ```

pub mod bind;
pub mod coerce;
pub mod error;
pub mod providers;
pub mod resolve;
pub mod schema;
pub mod secrets;
pub mod source;

pub use bind::{bind, bind_with_policy, BoundConfig, BoundValue};
pub use coerce::{coerce, CoercePolicy, PathMode, Shape, TupleArity, TypedValue};
pub use error::{ConfigError, Result};
pub use providers::{
    EnvSecretProvider, InlineSecretProvider, PromptSecretProvider, SecretProvider,
};
pub use resolve::{expand, expand_with_env, EnvSource, StdEnv};
pub use schema::{FieldSpec, Requirement, Schema, SchemaNode, SchemaRegistry, SecretSpec};
pub use secrets::{SecretHandle, SecretResolver, SecretSource};
pub use source::{RawTree, RawValue, SectionPath, Source, INHERIT_KEY};

/// Run the full pipeline with the process environment and default policy
pub fn load(sources: &[Source], schema: &Schema) -> Result<BoundConfig> {
    load_with(sources, schema, &StdEnv, &CoercePolicy::default())
}

/// Run the full pipeline with an injected environment and coercion policy
pub fn load_with(
    sources: &[Source],
    schema: &Schema,
    env: &dyn EnvSource,
    policy: &CoercePolicy,
) -> Result<BoundConfig> {
    let merged = RawTree::merge(sources)?;
    let expanded = expand_with_env(merged, env)?;
    bind_with_policy(&expanded, schema, policy)
}
