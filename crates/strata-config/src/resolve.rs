//! Placeholder expansion over the merged raw tree
//!
//! Raw values may embed `${...}` placeholders referencing other configuration
//! keys or environment variables. Expansion is a memoized recursive descent
//! over (section, key) pairs: each pair is resolved at most once per pass, and
//! a pair that is revisited while still in progress is a cycle and fails
//! immediately instead of looping.
//!
//! Reference forms inside `${...}`:
//! - `env:NAME` — the named environment variable, required to be set;
//! - a path containing `:` or `.` — an absolute section path plus key
//!   (`db:credentials:user` or `db.credentials.user`);
//! - a bare name — resolved in the current section first, then each ancestor
//!   section up to the root, then the environment.

use std::collections::HashMap;

use crate::error::{ConfigError, Result};
use crate::source::{RawTree, RawValue, SectionPath};

/// Seam for environment variable access, so tests can inject variables
/// without mutating the process environment.
pub trait EnvSource {
    /// Read a variable by exact name
    fn var(&self, name: &str) -> Option<String>;
}

/// Environment source backed by the process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct StdEnv;

impl EnvSource for StdEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Expand all placeholders in the tree against the process environment
pub fn expand(tree: RawTree) -> Result<RawTree> {
    expand_with_env(tree, &StdEnv)
}

/// Expand all placeholders in the tree against an injected environment
pub fn expand_with_env(tree: RawTree, env: &dyn EnvSource) -> Result<RawTree> {
    let mut expansion = Expansion {
        tree: &tree,
        env,
        cache: HashMap::new(),
        in_progress: Vec::new(),
    };

    let mut expanded = RawTree::default();
    for (section, entries) in tree.sections() {
        for (key, raw) in entries {
            let value = expansion.resolve(section, key)?;
            expanded.insert(
                section.clone(),
                key.clone(),
                RawValue {
                    value,
                    source: raw.source.clone(),
                },
            );
        }
        // Carry empty sections through unchanged.
        if entries.is_empty() {
            expanded.insert_section(section.clone());
        }
    }
    Ok(expanded)
}

struct Expansion<'a> {
    tree: &'a RawTree,
    env: &'a dyn EnvSource,
    cache: HashMap<(SectionPath, String), String>,
    in_progress: Vec<(SectionPath, String)>,
}

impl Expansion<'_> {
    fn resolve(&mut self, section: &SectionPath, key: &str) -> Result<String> {
        let pair = (section.clone(), key.to_string());
        if let Some(cached) = self.cache.get(&pair) {
            return Ok(cached.clone());
        }
        if let Some(start) = self.in_progress.iter().position(|p| p == &pair) {
            let mut chain: Vec<String> = self.in_progress[start..]
                .iter()
                .map(|(s, k)| s.key_path(k))
                .collect();
            chain.push(section.key_path(key));
            return Err(ConfigError::cyclic(chain.join(" -> ")));
        }

        let raw = self
            .tree
            .get(section, key)
            .map(|rv| rv.value.clone())
            .ok_or_else(|| {
                ConfigError::unresolved(section.key_path(key), section.key_path(key))
            })?;

        self.in_progress.push(pair.clone());
        let result = self.expand_value(&raw, section, key);
        self.in_progress.pop();

        let value = result?;
        self.cache.insert(pair, value.clone());
        Ok(value)
    }

    fn expand_value(&mut self, raw: &str, section: &SectionPath, key: &str) -> Result<String> {
        if !raw.contains("${") {
            return Ok(raw.to_string());
        }
        tracing::debug!(path = %section.key_path(key), "Expanding placeholders");

        let mut output = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(start) = rest.find("${") {
            output.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or_else(|| {
                ConfigError::unresolved(
                    format!("${{{after}"),
                    section.key_path(key),
                )
            })?;
            let reference = &after[..end];
            let replacement = self.resolve_reference(reference, section, key)?;
            output.push_str(&replacement);
            rest = &after[end + 1..];
        }
        output.push_str(rest);
        Ok(output)
    }

    fn resolve_reference(
        &mut self,
        reference: &str,
        section: &SectionPath,
        key: &str,
    ) -> Result<String> {
        let at_path = section.key_path(key);

        if let Some(name) = reference.strip_prefix("env:") {
            return self.env.var(name).ok_or_else(|| {
                ConfigError::unresolved(format!("env:{name}"), at_path.clone())
            });
        }

        if reference.contains(':') || reference.contains('.') {
            let (target_section, target_key) = split_reference(reference);
            if self.tree.get(&target_section, &target_key).is_some() {
                return self.resolve(&target_section, &target_key);
            }
            return Err(ConfigError::unresolved(reference, at_path));
        }

        // Bare name: current section, then ancestors, then the environment.
        for candidate in section.self_and_ancestors() {
            if self.tree.get(&candidate, reference).is_some() {
                return self.resolve(&candidate, reference);
            }
        }
        if let Some(value) = self.env.var(reference) {
            return Ok(value);
        }
        Err(ConfigError::unresolved(reference, at_path))
    }
}

/// Split an absolute reference into its section path and trailing key
fn split_reference(reference: &str) -> (SectionPath, String) {
    let delimiter = if reference.contains(':') { ':' } else { '.' };
    let mut parts: Vec<&str> = reference.split(delimiter).map(str::trim).collect();
    let key = parts.pop().unwrap_or_default().to_string();
    (SectionPath::from_segments(parts), key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;

    /// Environment stub that records every lookup
    #[derive(Default)]
    struct MapEnv {
        vars: HashMap<String, String>,
        lookups: std::cell::RefCell<Vec<String>>,
    }

    impl MapEnv {
        fn with(mut self, name: &str, value: &str) -> Self {
            self.vars.insert(name.to_string(), value.to_string());
            self
        }
    }

    impl EnvSource for MapEnv {
        fn var(&self, name: &str) -> Option<String> {
            self.lookups.borrow_mut().push(name.to_string());
            self.vars.get(name).cloned()
        }
    }

    fn tree_of(pairs: &[(&str, &str, &str)]) -> RawTree {
        let mut source = Source::new("test");
        for (section, key, value) in pairs {
            source = source.with_value(*section, *key, *value);
        }
        RawTree::merge(&[source]).unwrap()
    }

    #[test]
    fn test_plain_values_unchanged() {
        let tree = tree_of(&[("db", "host", "localhost"), ("db", "note", "cost: $5")]);
        let expanded = expand_with_env(tree, &MapEnv::default()).unwrap();
        assert_eq!(expanded.get(&"db".into(), "host").unwrap().value, "localhost");
        // A `$` not followed by `{` is literal text.
        assert_eq!(expanded.get(&"db".into(), "note").unwrap().value, "cost: $5");
    }

    #[test]
    fn test_env_reference() {
        let tree = tree_of(&[("db", "host", "${env:DB_HOST}")]);
        let env = MapEnv::default().with("DB_HOST", "localhost");
        let expanded = expand_with_env(tree, &env).unwrap();
        assert_eq!(expanded.get(&"db".into(), "host").unwrap().value, "localhost");
    }

    #[test]
    fn test_env_reference_unset_fails() {
        let tree = tree_of(&[("db", "host", "${env:DB_HOST}")]);
        let err = expand_with_env(tree, &MapEnv::default()).unwrap_err();
        match err {
            ConfigError::UnresolvedReference { reference, path } => {
                assert_eq!(reference, "env:DB_HOST");
                assert_eq!(path, "db.host");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_absolute_reference() {
        let tree = tree_of(&[
            ("db", "host", "pg.internal"),
            ("app", "dsn", "postgres://${db:host}/main"),
        ]);
        let expanded = expand_with_env(tree, &MapEnv::default()).unwrap();
        assert_eq!(
            expanded.get(&"app".into(), "dsn").unwrap().value,
            "postgres://pg.internal/main"
        );
    }

    #[test]
    fn test_relative_reference_prefers_current_section() {
        let tree = tree_of(&[
            ("", "name", "root-name"),
            ("app", "name", "app-name"),
            ("app", "title", "${name}"),
        ]);
        let expanded = expand_with_env(tree, &MapEnv::default()).unwrap();
        assert_eq!(expanded.get(&"app".into(), "title").unwrap().value, "app-name");
    }

    #[test]
    fn test_relative_reference_walks_ancestors() {
        let tree = tree_of(&[
            ("", "region", "eu-west"),
            ("db.replica", "endpoint", "${region}.db.example.com"),
        ]);
        let expanded = expand_with_env(tree, &MapEnv::default()).unwrap();
        assert_eq!(
            expanded.get(&"db.replica".into(), "endpoint").unwrap().value,
            "eu-west.db.example.com"
        );
    }

    #[test]
    fn test_relative_reference_falls_back_to_env() {
        let tree = tree_of(&[("app", "user", "${USER_NAME}")]);
        let env = MapEnv::default().with("USER_NAME", "svc-account");
        let expanded = expand_with_env(tree, &env).unwrap();
        assert_eq!(expanded.get(&"app".into(), "user").unwrap().value, "svc-account");
    }

    #[test]
    fn test_chained_references() {
        let tree = tree_of(&[
            ("", "base", "example.com"),
            ("", "host", "api.${base}"),
            ("app", "url", "https://${host}/v1"),
        ]);
        let expanded = expand_with_env(tree, &MapEnv::default()).unwrap();
        assert_eq!(
            expanded.get(&"app".into(), "url").unwrap().value,
            "https://api.example.com/v1"
        );
    }

    #[test]
    fn test_memoization_resolves_shared_key_once() {
        let tree = tree_of(&[
            ("", "shared", "${env:COUNTED}"),
            ("a", "x", "${shared}"),
            ("b", "y", "${shared}"),
        ]);
        let env = MapEnv::default().with("COUNTED", "v");
        let expanded = expand_with_env(tree, &env).unwrap();
        assert_eq!(expanded.get(&"a".into(), "x").unwrap().value, "v");
        assert_eq!(expanded.get(&"b".into(), "y").unwrap().value, "v");
        let counted = env
            .lookups
            .borrow()
            .iter()
            .filter(|n| n.as_str() == "COUNTED")
            .count();
        assert_eq!(counted, 1);
    }

    #[test]
    fn test_direct_self_reference_is_a_cycle() {
        let tree = tree_of(&[("a", "x", "${a:x}")]);
        let err = expand_with_env(tree, &MapEnv::default()).unwrap_err();
        match err {
            ConfigError::CyclicReference { cycle } => {
                assert!(cycle.contains("a.x -> a.x"), "cycle was: {cycle}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_longer_cycle_detected() {
        let tree = tree_of(&[
            ("a", "x", "${b:y}"),
            ("b", "y", "${c:z}"),
            ("c", "z", "${a:x}"),
        ]);
        let err = expand_with_env(tree, &MapEnv::default()).unwrap_err();
        assert!(matches!(err, ConfigError::CyclicReference { .. }));
    }

    #[test]
    fn test_unterminated_placeholder_fails() {
        let tree = tree_of(&[("a", "x", "prefix ${oops")]);
        let err = expand_with_env(tree, &MapEnv::default()).unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_dangling_absolute_reference() {
        let tree = tree_of(&[("a", "x", "${missing:key}")]);
        let err = expand_with_env(tree, &MapEnv::default()).unwrap_err();
        match err {
            ConfigError::UnresolvedReference { reference, .. } => {
                assert_eq!(reference, "missing:key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_provenance_preserved() {
        let tree = tree_of(&[("db", "host", "${env:DB_HOST}")]);
        let env = MapEnv::default().with("DB_HOST", "h");
        let expanded = expand_with_env(tree, &env).unwrap();
        assert_eq!(expanded.get(&"db".into(), "host").unwrap().source, "test");
    }
}
