//! Module registry keyed by name and version.
//!
//! # Invariants
//! - Two modules with the same name coexist only when their versions differ.
//! - Registering an equal module under an existing identity is a no-op;
//!   a different module under the same identity replaces the old entry.
//! - The registry never checks dependency satisfiability.

use crate::module::metadata::ModuleId;
use crate::module::Module;
use log::{debug, info};
use semver::Version;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of one `ModuleRegistry::add` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryChange {
    Inserted,
    Replaced,
    Unchanged,
}

/// Collection of all known modules.
#[derive(Debug, Default, Clone)]
pub struct ModuleRegistry {
    entries: BTreeMap<String, BTreeMap<Version, Arc<Module>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces one module.
    pub fn add(&mut self, module: impl Into<Arc<Module>>) -> RegistryChange {
        let module = module.into();
        let versions = self.entries.entry(module.name().to_string()).or_default();

        let identical = versions
            .get(module.version())
            .map(|existing| Arc::ptr_eq(existing, &module) || **existing == *module);

        match identical {
            Some(true) => {
                debug!(
                    "event=registry_add module=registry status=unchanged id={}",
                    module
                );
                RegistryChange::Unchanged
            }
            Some(false) => {
                info!(
                    "event=registry_add module=registry status=replaced id={}",
                    module
                );
                versions.insert(module.version().clone(), module);
                RegistryChange::Replaced
            }
            None => {
                debug!(
                    "event=registry_add module=registry status=inserted id={}",
                    module
                );
                versions.insert(module.version().clone(), module);
                RegistryChange::Inserted
            }
        }
    }

    pub fn get(&self, name: &str, version: &Version) -> Option<&Arc<Module>> {
        self.entries.get(name)?.get(version)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(|versions| !versions.is_empty())
    }

    /// Returns all registered versions of `name`, newest first.
    pub fn versions(&self, name: &str) -> Vec<Version> {
        self.modules_named(name)
            .map(|module| module.version().clone())
            .collect()
    }

    /// Iterates all registered modules named `name`, newest first.
    pub fn modules_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Arc<Module>> + 'a {
        self.entries
            .get(name)
            .into_iter()
            .flat_map(|versions| versions.values().rev())
    }

    pub fn latest(&self, name: &str) -> Option<&Arc<Module>> {
        self.modules_named(name).next()
    }

    /// Returns sorted module names.
    pub fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, versions)| !versions.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Iterates every registered module, ordered by name then version.
    pub fn modules(&self) -> impl Iterator<Item = &Arc<Module>> {
        self.entries.values().flat_map(|versions| versions.values())
    }

    /// Snapshot of every registered identity at call time.
    ///
    /// The returned sequence is unaffected by later registrations; clone it
    /// (or call `restart`) to iterate again.
    pub fn all_identities(&self) -> ModuleIdentities {
        let ids: Arc<[ModuleId]> = self.modules().map(|module| module.id()).collect();
        ModuleIdentities { ids, position: 0 }
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Restartable, snapshot-consistent sequence of registered identities.
#[derive(Debug, Clone)]
pub struct ModuleIdentities {
    ids: Arc<[ModuleId]>,
    position: usize,
}

impl ModuleIdentities {
    pub fn restart(&mut self) {
        self.position = 0;
    }
}

impl Iterator for ModuleIdentities {
    type Item = ModuleId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.get(self.position)?.clone();
        self.position += 1;
        Some(id)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.ids.len().saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ModuleIdentities {}

#[cfg(test)]
mod tests {
    use super::{ModuleRegistry, RegistryChange};
    use crate::module::code_unit::CodeUnit;
    use crate::module::metadata::{ModuleId, ModuleMetadata};
    use crate::module::Module;
    use semver::Version;
    use std::sync::Arc;

    fn module(name: &str, major: u64) -> Module {
        Module::builder(ModuleMetadata::new(name, Version::new(major, 0, 0)))
            .build()
            .expect("module build")
    }

    #[test]
    fn registers_and_lists_versions_newest_first() {
        let mut registry = ModuleRegistry::new();
        assert_eq!(registry.add(module("A", 1)), RegistryChange::Inserted);
        assert_eq!(registry.add(module("A", 3)), RegistryChange::Inserted);
        assert_eq!(registry.add(module("A", 2)), RegistryChange::Inserted);

        assert_eq!(
            registry.versions("A"),
            vec![
                Version::new(3, 0, 0),
                Version::new(2, 0, 0),
                Version::new(1, 0, 0)
            ]
        );
        assert_eq!(registry.latest("A").expect("latest").version().major, 3);
        assert!(registry.versions("missing").is_empty());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn identical_reregistration_is_a_no_op() {
        let mut registry = ModuleRegistry::new();
        let shared = Arc::new(module("A", 1));
        registry.add(shared.clone());

        assert_eq!(registry.add(shared.clone()), RegistryChange::Unchanged);
        assert_eq!(registry.add(module("A", 1)), RegistryChange::Unchanged);
        let stored = registry.get("A", &Version::new(1, 0, 0)).expect("stored");
        assert!(Arc::ptr_eq(stored, &shared));
    }

    #[test]
    fn different_module_under_same_identity_replaces() {
        let mut registry = ModuleRegistry::new();
        registry.add(module("A", 1));
        let changed = Module::builder(ModuleMetadata::new("A", Version::new(1, 0, 0)))
            .code_unit(CodeUnit::new("a.Extra"))
            .build()
            .expect("module build");

        assert_eq!(registry.add(changed), RegistryChange::Replaced);
        assert_eq!(registry.len(), 1);
        let stored = registry.get("A", &Version::new(1, 0, 0)).expect("stored");
        assert_eq!(stored.code_units().count(), 1);
    }

    #[test]
    fn identity_snapshot_ignores_later_mutation_and_restarts() {
        let mut registry = ModuleRegistry::new();
        registry.add(module("A", 1));
        registry.add(module("B", 1));

        let mut identities = registry.all_identities();
        registry.add(module("C", 1));

        let first: Vec<ModuleId> = identities.by_ref().collect();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].name, "A");

        identities.restart();
        assert_eq!(identities.count(), 2);
        assert_eq!(registry.all_identities().len(), 3);
    }
}
