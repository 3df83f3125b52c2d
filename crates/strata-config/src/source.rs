//! Sources, section paths, and the merged raw tree
//!
//! A [`Source`] is a named, ordered set of section → key → raw string values,
//! produced by an external file-format parser or built in memory. Sources are
//! merged in priority order into a [`RawTree`]: later sources override earlier
//! ones for the same section and key, and each value remembers which source
//! last set it.
//!
//! A section may declare that it extends another section by carrying the
//! reserved key `inherits`; after all sources are merged, keys missing from
//! the child are filled in from the referenced section (transitively).

use indexmap::IndexMap;
use std::fmt;

use crate::error::{ConfigError, Result};

/// Reserved key marking a section as extending another section path
pub const INHERIT_KEY: &str = "inherits";

/// An ordered sequence of section names identifying a position in the tree.
///
/// The root is the empty path. Parses from dotted (`db.credentials`) or
/// colon-delimited (`db:credentials`) text and displays dotted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SectionPath {
    segments: Vec<String>,
}

impl SectionPath {
    /// The root (empty) path
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from explicit segments
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a path from `:`- or `.`-delimited text; empty text is the root
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            return Self::root();
        }
        let delimiter = if text.contains(':') { ':' } else { '.' };
        Self {
            segments: text
                .split(delimiter)
                .map(|s| s.trim().to_string())
                .collect(),
        }
    }

    /// The path one level deeper
    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self { segments }
    }

    /// The enclosing path, or `None` at the root
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            None
        } else {
            Some(Self {
                segments: self.segments[..self.segments.len() - 1].to_vec(),
            })
        }
    }

    /// Whether this is the root path
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The path segments in order
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// This path followed by each ancestor, ending at the root
    pub fn self_and_ancestors(&self) -> Vec<SectionPath> {
        let mut paths = Vec::with_capacity(self.segments.len() + 1);
        let mut current = self.clone();
        loop {
            paths.push(current.clone());
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        paths
    }

    /// Dotted `section.key` form for diagnostics
    pub fn key_path(&self, key: &str) -> String {
        if self.is_root() {
            key.to_string()
        } else {
            format!("{}.{}", self, key)
        }
    }
}

impl fmt::Display for SectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl From<&str> for SectionPath {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

/// A raw string value plus the name of the source that last set it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawValue {
    /// The raw, not-yet-expanded string
    pub value: String,
    /// Name of the source the value came from
    pub source: String,
}

/// A named, ordered origin of configuration values.
///
/// Immutable once handed to [`RawTree::merge`]. The concrete INI/TOML parser
/// is an external collaborator that produces this shape.
#[derive(Debug, Clone, Default)]
pub struct Source {
    name: String,
    sections: IndexMap<SectionPath, IndexMap<String, String>>,
}

impl Source {
    /// Create an empty source with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sections: IndexMap::new(),
        }
    }

    /// The source name, used for provenance
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a single key/value under a section path (builder pattern)
    pub fn with_value(
        mut self,
        section: impl Into<SectionPath>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.sections
            .entry(section.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    /// Add several key/value pairs under one section path
    pub fn with_values<I, K, V>(mut self, section: impl Into<SectionPath>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entry = self.sections.entry(section.into()).or_default();
        for (key, value) in pairs {
            entry.insert(key.into(), value.into());
        }
        self
    }

    /// Mark a section as inheriting the keys of another section path
    pub fn with_inherits(
        self,
        section: impl Into<SectionPath>,
        parent: impl Into<SectionPath>,
    ) -> Self {
        let parent = parent.into();
        self.with_value(section, INHERIT_KEY, parent.to_string())
    }

    /// Iterate sections in declaration order
    pub fn sections(&self) -> impl Iterator<Item = (&SectionPath, &IndexMap<String, String>)> {
        self.sections.iter()
    }
}

/// The merged configuration tree of raw string values.
///
/// Mutated only while merging; read-only afterward and safe to share.
#[derive(Debug, Clone, Default)]
pub struct RawTree {
    sections: IndexMap<SectionPath, IndexMap<String, RawValue>>,
}

impl RawTree {
    /// Merge sources in priority order: later sources win per section+key.
    ///
    /// After the merge, section inheritance declared via [`INHERIT_KEY`] is
    /// applied: keys the child does not define fall back to the referenced
    /// parent section, transitively. A missing parent or an inheritance cycle
    /// is a [`ConfigError::Source`].
    pub fn merge(sources: &[Source]) -> Result<RawTree> {
        let mut tree = RawTree::default();

        for source in sources {
            if source.name().is_empty() {
                return Err(ConfigError::source(
                    "<unnamed>",
                    "source name must not be empty",
                ));
            }
            tracing::debug!(source = source.name(), "Merging source");
            for (path, entries) in source.sections() {
                tree.ensure_section(path);
                let section = tree.sections.entry(path.clone()).or_default();
                for (key, value) in entries {
                    section.insert(
                        key.clone(),
                        RawValue {
                            value: value.clone(),
                            source: source.name().to_string(),
                        },
                    );
                }
            }
        }

        tree.apply_inheritance()?;
        Ok(tree)
    }

    /// Look up a raw value by section path and key
    pub fn get(&self, section: &SectionPath, key: &str) -> Option<&RawValue> {
        self.sections.get(section)?.get(key)
    }

    /// The keys of one section, in insertion order
    pub fn section(&self, path: &SectionPath) -> Option<&IndexMap<String, RawValue>> {
        self.sections.get(path)
    }

    /// Whether a section path exists in the tree
    pub fn contains_section(&self, path: &SectionPath) -> bool {
        self.sections.contains_key(path)
    }

    /// Iterate all sections in merge order
    pub fn sections(&self) -> impl Iterator<Item = (&SectionPath, &IndexMap<String, RawValue>)> {
        self.sections.iter()
    }

    /// Total number of keys across all sections
    pub fn len(&self) -> usize {
        self.sections.values().map(IndexMap::len).sum()
    }

    /// Whether the tree holds no values at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn insert_section(&mut self, section: SectionPath) {
        self.ensure_section(&section);
    }

    pub(crate) fn insert(&mut self, section: SectionPath, key: String, value: RawValue) {
        self.ensure_section(&section);
        self.sections.entry(section).or_default().insert(key, value);
    }

    /// Keep the section-path invariant: every ancestor of a section exists.
    fn ensure_section(&mut self, path: &SectionPath) {
        for ancestor in path.self_and_ancestors().into_iter().rev() {
            self.sections.entry(ancestor).or_default();
        }
    }

    fn apply_inheritance(&mut self) -> Result<()> {
        let children: Vec<SectionPath> = self
            .sections
            .iter()
            .filter(|(_, entries)| entries.contains_key(INHERIT_KEY))
            .map(|(path, _)| path.clone())
            .collect();

        for child in &children {
            let mut visited = vec![child.clone()];
            let mut current = SectionPath::parse(
                &self.sections[child][INHERIT_KEY].value.clone(),
            );

            loop {
                if visited.contains(&current) {
                    let cycle: Vec<String> =
                        visited.iter().map(ToString::to_string).collect();
                    return Err(ConfigError::source(
                        child.to_string(),
                        format!(
                            "section inheritance cycle: {} -> {}",
                            cycle.join(" -> "),
                            current
                        ),
                    ));
                }
                let parent_entries = match self.sections.get(&current) {
                    Some(entries) => entries.clone(),
                    None => {
                        return Err(ConfigError::source(
                            child.to_string(),
                            format!("inherits from section `{current}` which does not exist"),
                        ));
                    }
                };
                tracing::debug!(child = %child, parent = %current, "Applying section inheritance");

                let child_entries = self.sections.entry(child.clone()).or_default();
                for (key, value) in &parent_entries {
                    if key != INHERIT_KEY && !child_entries.contains_key(key) {
                        child_entries.insert(key.clone(), value.clone());
                    }
                }

                visited.push(current.clone());
                match parent_entries.get(INHERIT_KEY) {
                    Some(next) => current = SectionPath::parse(&next.value),
                    None => break,
                }
            }
        }

        // The marker key is not configuration data.
        for entries in self.sections.values_mut() {
            entries.shift_remove(INHERIT_KEY);
        }
        Ok(())
    }
}
