//! Process-wide capability whitelist.
//!
//! # Responsibility
//! - Record which code units and namespaces sandboxed code may use.
//! - Record runtime permissions granted per namespace.
//!
//! # Invariants
//! - The set only grows. There is no revocation API, so a snapshot shared
//!   with an environment never shrinks while that environment is alive.
//! - A permitted namespace covers all of its sub-namespaces; so does a grant.

use crate::module::code_unit::{namespace_ancestors, CodeUnitId};
use crate::module::Module;
use crate::sandbox::permission::RuntimePermission;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    api_units: BTreeSet<CodeUnitId>,
    api_namespaces: BTreeSet<String>,
    grants: BTreeMap<String, BTreeSet<RuntimePermission>>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_api_unit(&mut self, unit: impl Into<CodeUnitId>) {
        self.api_units.insert(unit.into());
    }

    pub fn add_api_namespace(&mut self, namespace: impl Into<String>) {
        self.api_namespaces.insert(namespace.into());
    }

    pub fn grant_permission(&mut self, namespace: impl Into<String>, permission: RuntimePermission) {
        self.grants
            .entry(namespace.into())
            .or_default()
            .insert(permission);
    }

    /// Merges the statically declared API surface of `module`.
    ///
    /// Returns how many new entries were added.
    pub fn merge_module_api(&mut self, module: &Module) -> usize {
        let before = self.api_units.len() + self.api_namespaces.len();
        self.api_units.extend(module.api_units().cloned());
        self.api_namespaces
            .extend(module.api_namespaces().map(str::to_string));
        self.api_units.len() + self.api_namespaces.len() - before
    }

    pub fn is_permitted(&self, unit: &CodeUnitId) -> bool {
        self.api_units.contains(unit) || self.is_namespace_permitted(unit.namespace())
    }

    pub fn is_namespace_permitted(&self, namespace: &str) -> bool {
        namespace_ancestors(namespace).any(|candidate| self.api_namespaces.contains(candidate))
    }

    /// Returns whether code in `namespace` holds `permission`.
    pub fn has_permission(&self, namespace: &str, permission: RuntimePermission) -> bool {
        namespace_ancestors(namespace).any(|candidate| {
            self.grants
                .get(candidate)
                .is_some_and(|granted| granted.contains(&permission))
        })
    }

    pub fn api_units(&self) -> impl Iterator<Item = &CodeUnitId> {
        self.api_units.iter()
    }

    pub fn api_namespaces(&self) -> impl Iterator<Item = &str> {
        self.api_namespaces.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.api_units.len() + self.api_namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
