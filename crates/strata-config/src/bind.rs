//! Schema binding
//!
//! Walks a [`Schema`] against an expanded [`RawTree`] and produces a
//! [`BoundConfig`] of typed values. Binding is all-or-nothing: the first
//! missing required field or coercion failure aborts with the full dotted
//! path of the offender.
//!
//! Secret fields are never fetched here. They bind to a
//! [`SecretHandle`](crate::SecretHandle) carrying the backend discriminator
//! (taken from the sibling `<field>_source` key, falling back to the field's
//! declared default source) and the locator (the field's raw value).

use indexmap::IndexMap;

use crate::coerce::{coerce, CoercePolicy, TypedValue};
use crate::error::{ConfigError, Result};
use crate::schema::{FieldSpec, Requirement, Schema, SchemaNode, SecretSpec};
use crate::secrets::{SecretHandle, SecretSource};
use crate::source::{RawTree, SectionPath};

/// One bound configuration entry
#[derive(Debug, Clone)]
pub enum BoundValue {
    /// A coerced typed value
    Value(TypedValue),
    /// A lazily resolved secret
    Secret(SecretHandle),
    /// A nested section
    Section(IndexMap<String, BoundValue>),
    /// An optional field that had no value
    Absent,
}

impl BoundValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, BoundValue::Absent)
    }
}

/// The typed result of binding a schema against a merged tree
#[derive(Debug, Clone)]
pub struct BoundConfig {
    root: IndexMap<String, BoundValue>,
}

impl BoundConfig {
    /// Look up an entry by dotted path
    pub fn get(&self, path: &str) -> Option<&BoundValue> {
        let mut parts = path.split('.');
        let mut current = self.root.get(parts.next()?)?;
        for part in parts {
            match current {
                BoundValue::Section(entries) => current = entries.get(part)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Look up a typed value by dotted path
    pub fn get_value(&self, path: &str) -> Option<&TypedValue> {
        match self.get(path)? {
            BoundValue::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Look up a secret handle by dotted path
    pub fn get_secret(&self, path: &str) -> Option<&SecretHandle> {
        match self.get(path)? {
            BoundValue::Secret(handle) => Some(handle),
            _ => None,
        }
    }

    /// Look up a nested section by dotted path
    pub fn get_section(&self, path: &str) -> Option<&IndexMap<String, BoundValue>> {
        match self.get(path)? {
            BoundValue::Section(entries) => Some(entries),
            _ => None,
        }
    }

    /// The top-level entries in schema declaration order
    pub fn root(&self) -> &IndexMap<String, BoundValue> {
        &self.root
    }
}

/// Bind a schema with the default coercion policy
pub fn bind(tree: &RawTree, schema: &Schema) -> Result<BoundConfig> {
    bind_with_policy(tree, schema, &CoercePolicy::default())
}

/// Bind a schema against an expanded tree
pub fn bind_with_policy(
    tree: &RawTree,
    schema: &Schema,
    policy: &CoercePolicy,
) -> Result<BoundConfig> {
    tracing::debug!(schema = schema.name(), "Binding schema");
    let root = bind_section(tree, &SectionPath::root(), schema, policy)?;
    Ok(BoundConfig { root })
}

fn bind_section(
    tree: &RawTree,
    section: &SectionPath,
    schema: &Schema,
    policy: &CoercePolicy,
) -> Result<IndexMap<String, BoundValue>> {
    let mut entries = IndexMap::with_capacity(schema.nodes().len());
    for node in schema.nodes() {
        match node {
            SchemaNode::Field { name, spec } => {
                entries.insert(name.clone(), bind_field(tree, section, name, spec, policy)?);
            }
            SchemaNode::Section { name, schema: nested } => {
                let child = section.child(name);
                entries.insert(
                    name.clone(),
                    BoundValue::Section(bind_section(tree, &child, nested, policy)?),
                );
            }
        }
    }
    Ok(entries)
}

fn bind_field(
    tree: &RawTree,
    section: &SectionPath,
    name: &str,
    spec: &FieldSpec,
    policy: &CoercePolicy,
) -> Result<BoundValue> {
    // A parent-bound field is declared here but its value lives one level up.
    let lookup = if spec.bind_to_parent {
        section.parent().unwrap_or_else(SectionPath::root)
    } else {
        section.clone()
    };
    let field_path = section.key_path(name);
    let raw = tree.get(&lookup, name);

    if let Some(secret_spec) = &spec.secret {
        return bind_secret_field(
            tree,
            &lookup,
            name,
            &field_path,
            spec,
            secret_spec,
            raw.map(|r| r.value.as_str()),
        );
    }

    match raw {
        Some(raw) => coerce(&raw.value, &spec.shape, spec.delimiter, policy)
            .map(BoundValue::Value)
            .map_err(|e| e.at_path(&field_path)),
        None => match &spec.requirement {
            Requirement::Required => Err(ConfigError::missing_required(&field_path)),
            Requirement::Optional => Ok(BoundValue::Absent),
            Requirement::Default(default) => coerce(default, &spec.shape, spec.delimiter, policy)
                .map(BoundValue::Value)
                .map_err(|e| e.at_path(&field_path)),
        },
    }
}

#[allow(clippy::too_many_arguments)]
fn bind_secret_field(
    tree: &RawTree,
    lookup: &SectionPath,
    name: &str,
    field_path: &str,
    spec: &FieldSpec,
    secret_spec: &SecretSpec,
    raw: Option<&str>,
) -> Result<BoundValue> {
    // The sibling `<field>_source` key names the backend for this field.
    let discriminator_key = format!("{name}_source");
    let source = match tree.get(lookup, &discriminator_key) {
        Some(value) => value.value.parse::<SecretSource>().map_err(|reason| {
            ConfigError::coercion("secret source", &value.value, reason)
                .at_path(&lookup.key_path(&discriminator_key))
        })?,
        None => secret_spec.default_source,
    };
    if !secret_spec.allowed_sources.contains(&source) {
        return Err(ConfigError::coercion(
            "secret source",
            source.to_string(),
            format!("source `{source}` is not allowed for this field"),
        )
        .at_path(field_path));
    }

    let locator = match raw {
        Some(raw) => raw.to_string(),
        // Prompt secrets need no configured value; the field path labels
        // the prompt.
        None if source == SecretSource::Prompt => field_path.to_string(),
        None => match &spec.requirement {
            Requirement::Required => {
                return Err(ConfigError::missing_required(field_path));
            }
            Requirement::Optional => return Ok(BoundValue::Absent),
            Requirement::Default(default) => default.clone(),
        },
    };

    Ok(BoundValue::Secret(SecretHandle::new(
        source, locator, field_path,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::Shape;
    use crate::schema::SecretSpec;
    use crate::source::Source;

    fn tree_of(source: Source) -> RawTree {
        RawTree::merge(&[source]).unwrap()
    }

    #[test]
    fn test_bind_required_and_default() {
        let tree = tree_of(Source::new("s").with_value("db", "host", "db.internal"));
        let schema = Schema::new("app").with_section(
            "db",
            Schema::new("db")
                .with_field("host", FieldSpec::required(Shape::Str))
                .with_field("port", FieldSpec::with_default(Shape::Int, "5432")),
        );

        let config = bind(&tree, &schema).unwrap();
        assert_eq!(
            config.get_value("db.host").unwrap(),
            &TypedValue::Str("db.internal".to_string())
        );
        assert_eq!(config.get_value("db.port").unwrap(), &TypedValue::Int(5432));
    }

    #[test]
    fn test_missing_required_names_full_path() {
        let tree = tree_of(Source::new("s").with_value("db", "port", "5432"));
        let schema = Schema::new("app").with_section(
            "db",
            Schema::new("db").with_field("host", FieldSpec::required(Shape::Str)),
        );

        let err = bind(&tree, &schema).unwrap_err();
        match err {
            ConfigError::MissingRequiredField { path } => assert_eq!(path, "db.host"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_optional_binds_absent() {
        let tree = tree_of(Source::new("s"));
        let schema = Schema::new("app").with_field("debug", FieldSpec::optional(Shape::Bool));

        let config = bind(&tree, &schema).unwrap();
        assert!(config.get("debug").unwrap().is_absent());
    }

    #[test]
    fn test_coercion_error_carries_field_path() {
        let tree = tree_of(Source::new("s").with_value("db", "port", "not-a-number"));
        let schema = Schema::new("app").with_section(
            "db",
            Schema::new("db").with_field("port", FieldSpec::required(Shape::Int)),
        );

        let err = bind(&tree, &schema).unwrap_err();
        assert_eq!(err.path(), Some("db.port"));
    }

    #[test]
    fn test_delimiter_hint_applied() {
        let tree = tree_of(Source::new("s").with_value("", "hosts", "a,1|b,2"));
        let schema = Schema::new("app").with_field(
            "hosts",
            FieldSpec::required(Shape::list(Shape::Str)).with_delimiter('|'),
        );

        let config = bind(&tree, &schema).unwrap();
        let hosts = config.get_value("hosts").unwrap().as_slice().unwrap();
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0], TypedValue::Str("a,1".to_string()));
    }

    #[test]
    fn test_bind_to_parent_reads_enclosing_section() {
        let tree = tree_of(
            Source::new("s")
                .with_value("db", "environment", "prod")
                .with_value("db.credentials", "user", "admin"),
        );
        let schema = Schema::new("app").with_section(
            "db",
            Schema::new("db").with_section(
                "credentials",
                Schema::new("credentials")
                    .with_field("user", FieldSpec::required(Shape::Str))
                    .with_field(
                        "environment",
                        FieldSpec::required(Shape::Str).from_parent(),
                    ),
            ),
        );

        let config = bind(&tree, &schema).unwrap();
        assert_eq!(
            config.get_value("db.credentials.environment").unwrap(),
            &TypedValue::Str("prod".to_string())
        );
    }

    #[test]
    fn test_secret_binds_handle_without_fetching() {
        let tree = tree_of(
            Source::new("s")
                .with_value("db", "password", "db/primary/password")
                .with_value("db", "password_source", "store"),
        );
        let schema = Schema::new("app").with_section(
            "db",
            Schema::new("db").with_field(
                "password",
                FieldSpec::required(Shape::Str).with_secret(
                    SecretSpec::new(SecretSource::Env).allowing([SecretSource::Store]),
                ),
            ),
        );

        let config = bind(&tree, &schema).unwrap();
        let handle = config.get_secret("db.password").unwrap();
        assert_eq!(handle.source(), SecretSource::Store);
        assert_eq!(handle.locator(), "db/primary/password");
        assert_eq!(handle.path(), "db.password");
        assert!(!handle.is_resolved());
    }

    #[test]
    fn test_secret_default_source_when_no_discriminator() {
        let tree = tree_of(Source::new("s").with_value("db", "password", "DB_PASSWORD"));
        let schema = Schema::new("app").with_section(
            "db",
            Schema::new("db").with_field(
                "password",
                FieldSpec::required(Shape::Str).with_secret(SecretSpec::new(SecretSource::Env)),
            ),
        );

        let config = bind(&tree, &schema).unwrap();
        let handle = config.get_secret("db.password").unwrap();
        assert_eq!(handle.source(), SecretSource::Env);
        assert_eq!(handle.locator(), "DB_PASSWORD");
    }

    #[test]
    fn test_secret_disallowed_source_rejected() {
        let tree = tree_of(
            Source::new("s")
                .with_value("db", "password", "hunter2")
                .with_value("db", "password_source", "inline"),
        );
        let schema = Schema::new("app").with_section(
            "db",
            Schema::new("db").with_field(
                "password",
                FieldSpec::required(Shape::Str).with_secret(SecretSpec::new(SecretSource::Env)),
            ),
        );

        let err = bind(&tree, &schema).unwrap_err();
        assert_eq!(err.path(), Some("db.password"));
        assert!(err.to_string().contains("not allowed"));
    }

    #[test]
    fn test_secret_unknown_discriminator_rejected() {
        let tree = tree_of(
            Source::new("s")
                .with_value("db", "password", "x")
                .with_value("db", "password_source", "carrier-pigeon"),
        );
        let schema = Schema::new("app").with_section(
            "db",
            Schema::new("db").with_field(
                "password",
                FieldSpec::required(Shape::Str).with_secret(SecretSpec::new(SecretSource::Env)),
            ),
        );

        let err = bind(&tree, &schema).unwrap_err();
        assert_eq!(err.path(), Some("db.password_source"));
    }

    #[test]
    fn test_prompt_secret_needs_no_value() {
        let tree = tree_of(Source::new("s"));
        let schema = Schema::new("app").with_section(
            "db",
            Schema::new("db").with_field(
                "password",
                FieldSpec::required(Shape::Str)
                    .with_secret(SecretSpec::new(SecretSource::Prompt)),
            ),
        );

        let config = bind(&tree, &schema).unwrap();
        let handle = config.get_secret("db.password").unwrap();
        assert_eq!(handle.source(), SecretSource::Prompt);
        assert_eq!(handle.locator(), "db.password");
    }

    #[test]
    fn test_optional_secret_absent_without_value() {
        let tree = tree_of(Source::new("s"));
        let schema = Schema::new("app").with_field(
            "token",
            FieldSpec::optional(Shape::Str).with_secret(SecretSpec::new(SecretSource::Env)),
        );

        let config = bind(&tree, &schema).unwrap();
        assert!(config.get("token").unwrap().is_absent());
    }

    #[test]
    fn test_nested_section_order_preserved() {
        let tree = tree_of(
            Source::new("s")
                .with_value("a", "x", "1")
                .with_value("b", "y", "2"),
        );
        let schema = Schema::new("app")
            .with_section("a", Schema::new("a").with_field("x", FieldSpec::required(Shape::Int)))
            .with_section("b", Schema::new("b").with_field("y", FieldSpec::required(Shape::Int)));

        let config = bind(&tree, &schema).unwrap();
        let names: Vec<&String> = config.root().keys().collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
