//! Code unit identifiers and namespace containment.
//!
//! # Invariants
//! - A code unit id is a non-empty dotted path with no empty segments.
//! - Namespace containment is segment-wise: `a.b` contains `a.b.C` and
//!   `a.b.c.D`, never `a.bc.D`.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Opaque identifier for one loadable unit of code, e.g. `host.world.Block`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeUnitId(String);

impl CodeUnitId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace part of the id (everything before the last `.`).
    ///
    /// Returns an empty string for a unit declared at the root.
    pub fn namespace(&self) -> &str {
        match self.0.rfind('.') {
            Some(pos) => &self.0[..pos],
            None => "",
        }
    }

    /// Returns whether this unit lives in `namespace` or one of its children.
    pub fn is_within(&self, namespace: &str) -> bool {
        namespace_contains(namespace, self.namespace())
    }
}

impl Display for CodeUnitId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CodeUnitId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CodeUnitId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One code unit contributed by a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeUnit {
    pub id: CodeUnitId,
    /// Direct polymorphic parents of this unit.
    #[serde(default)]
    pub supertypes: Vec<CodeUnitId>,
    /// Declared open for cross-module use.
    #[serde(default)]
    pub api: bool,
}

impl CodeUnit {
    pub fn new(id: impl Into<CodeUnitId>) -> Self {
        Self {
            id: id.into(),
            supertypes: Vec::new(),
            api: false,
        }
    }

    pub fn with_supertype(mut self, supertype: impl Into<CodeUnitId>) -> Self {
        self.supertypes.push(supertype.into());
        self
    }

    pub fn as_api(mut self) -> Self {
        self.api = true;
        self
    }
}

/// Segment-wise namespace containment; the empty namespace is the root.
pub fn namespace_contains(outer: &str, inner: &str) -> bool {
    if outer.is_empty() {
        return true;
    }
    match inner.strip_prefix(outer) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}

/// Iterates `namespace` and all of its ancestors, innermost first.
pub fn namespace_ancestors(namespace: &str) -> impl Iterator<Item = &str> {
    let mut current = Some(namespace).filter(|value| !value.is_empty());
    std::iter::from_fn(move || {
        let value = current?;
        current = value.rfind('.').map(|pos| &value[..pos]);
        Some(value)
    })
}

#[cfg(test)]
mod tests {
    use super::{namespace_ancestors, namespace_contains, CodeUnit, CodeUnitId};

    #[test]
    fn splits_namespace_from_unit_name() {
        let id = CodeUnitId::new("host.world.block.Block");
        assert_eq!(id.namespace(), "host.world.block");
        assert_eq!(CodeUnitId::new("Root").namespace(), "");
    }

    #[test]
    fn namespace_containment_is_segment_wise() {
        assert!(namespace_contains("host.world", "host.world"));
        assert!(namespace_contains("host.world", "host.world.block"));
        assert!(!namespace_contains("host.world", "host.worldgen"));
        assert!(namespace_contains("", "anything.at.all"));

        let id = CodeUnitId::new("host.world.block.Block");
        assert!(id.is_within("host"));
        assert!(id.is_within("host.world.block"));
        assert!(!id.is_within("host.world.block.Block"));
    }

    #[test]
    fn walks_namespace_ancestors_innermost_first() {
        let ancestors: Vec<&str> = namespace_ancestors("a.b.c").collect();
        assert_eq!(ancestors, vec!["a.b.c", "a.b", "a"]);
        assert_eq!(namespace_ancestors("").count(), 0);
    }

    #[test]
    fn builder_sets_supertypes_and_api_marker() {
        let unit = CodeUnit::new("mod.a.Thing")
            .with_supertype("host.Component")
            .as_api();
        assert!(unit.api);
        assert_eq!(unit.supertypes, vec![CodeUnitId::new("host.Component")]);
    }
}
