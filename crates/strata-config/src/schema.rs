//! Schema declaration and registry
//!
//! A [`Schema`] declares the fields and nested sections a configuration is
//! bound against: each field names its [`Shape`](crate::coerce::Shape), its
//! requirement level, an optional delimiter hint, and whether it is a secret.
//! Schemas can extend one another; the [`SchemaRegistry`] flattens extension
//! chains at registration time so binding never walks parents.

use serde::{Deserialize, Serialize};

use crate::coerce::Shape;
use crate::error::{ConfigError, Result};
use crate::secrets::SecretSource;

/// Requirement level of a field
#[derive(Debug, Clone, PartialEq)]
pub enum Requirement {
    /// Binding fails when the field has no value
    Required,
    /// The field binds as absent when it has no value
    Optional,
    /// The raw default is coerced like a source value when the field is missing
    Default(String),
}

/// Declaration of a secret field: which backends may serve it and which one
/// is used when the configuration names none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretSpec {
    pub allowed_sources: Vec<SecretSource>,
    pub default_source: SecretSource,
}

impl SecretSpec {
    pub fn new(default_source: SecretSource) -> Self {
        Self {
            allowed_sources: vec![default_source],
            default_source,
        }
    }

    pub fn allowing<I: IntoIterator<Item = SecretSource>>(mut self, sources: I) -> Self {
        for source in sources {
            if !self.allowed_sources.contains(&source) {
                self.allowed_sources.push(source);
            }
        }
        self
    }
}

/// Declaration of a single field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub shape: Shape,
    pub requirement: Requirement,
    /// Explicit delimiter hint for container shapes
    pub delimiter: Option<char>,
    /// Present when the field resolves through a secret backend
    pub secret: Option<SecretSpec>,
    /// Look the key up in the parent section instead of this one
    pub bind_to_parent: bool,
}

impl FieldSpec {
    pub fn required(shape: Shape) -> Self {
        Self {
            shape,
            requirement: Requirement::Required,
            delimiter: None,
            secret: None,
            bind_to_parent: false,
        }
    }

    pub fn optional(shape: Shape) -> Self {
        Self {
            requirement: Requirement::Optional,
            ..Self::required(shape)
        }
    }

    pub fn with_default(shape: Shape, default: impl Into<String>) -> Self {
        Self {
            requirement: Requirement::Default(default.into()),
            ..Self::required(shape)
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_secret(mut self, spec: SecretSpec) -> Self {
        self.secret = Some(spec);
        self
    }

    pub fn from_parent(mut self) -> Self {
        self.bind_to_parent = true;
        self
    }
}

/// A named entry in a schema: either a leaf field or a nested section
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Field { name: String, spec: FieldSpec },
    Section { name: String, schema: Schema },
}

impl SchemaNode {
    pub fn name(&self) -> &str {
        match self {
            SchemaNode::Field { name, .. } | SchemaNode::Section { name, .. } => name,
        }
    }
}

/// A configuration schema: an ordered set of fields and nested sections
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    extends: Option<String>,
    nodes: Vec<SchemaNode>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extends: None,
            nodes: Vec::new(),
        }
    }

    /// Inherit every field and section of a previously registered schema.
    /// Resolved when this schema is registered, not at binding.
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.push_node(SchemaNode::Field {
            name: name.into(),
            spec,
        });
        self
    }

    pub fn with_section(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.push_node(SchemaNode::Section {
            name: name.into(),
            schema,
        });
        self
    }

    /// Insert or override by name, keeping declaration order for new names.
    fn push_node(&mut self, node: SchemaNode) {
        if let Some(existing) = self.nodes.iter_mut().find(|n| n.name() == node.name()) {
            *existing = node;
        } else {
            self.nodes.push(node);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[SchemaNode] {
        &self.nodes
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.nodes.iter().find_map(|node| match node {
            SchemaNode::Field { name: n, spec } if n == name => Some(spec),
            _ => None,
        })
    }

    pub fn section(&self, name: &str) -> Option<&Schema> {
        self.nodes.iter().find_map(|node| match node {
            SchemaNode::Section { name: n, schema } if n == name => Some(schema),
            _ => None,
        })
    }

    /// Overlay `child` nodes onto a copy of this schema. Parent declaration
    /// order is kept; overriding nodes replace in place, new ones append.
    fn merged_with(&self, child: &Schema) -> Schema {
        let mut merged = Schema {
            name: child.name.clone(),
            extends: None,
            nodes: self.nodes.clone(),
        };
        for node in &child.nodes {
            merged.push_node(node.clone());
        }
        merged
    }
}

/// Registry of named schemas with extension flattening.
///
/// Parents must be registered before children that extend them. Registration
/// stores the flattened form, so later changes to a parent never reach
/// already-registered children.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: indexmap::IndexMap<String, Schema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema, flattening its `extends` chain.
    pub fn register(&mut self, schema: Schema) -> Result<()> {
        let name = schema.name.clone();
        if self.schemas.contains_key(&name) {
            return Err(ConfigError::schema(&name, "schema already registered"));
        }
        let flattened = match &schema.extends {
            Some(parent_name) => {
                let parent = self.schemas.get(parent_name).ok_or_else(|| {
                    ConfigError::schema(
                        &name,
                        format!("extends unknown schema `{parent_name}`"),
                    )
                })?;
                parent.merged_with(&schema)
            }
            None => schema,
        };
        tracing::debug!(schema = %name, fields = flattened.nodes.len(), "Registered schema");
        self.schemas.insert(name, flattened);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
