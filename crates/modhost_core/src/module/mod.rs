//! Module data model and registry.
//!
//! # Responsibility
//! - Describe one extension unit: identity, dependencies, contributed code
//!   units and its opaque resource bundle.
//! - Keep every registered module queryable by name and version.
//!
//! # Invariants
//! - A `Module` is immutable once built; rewriting dependencies produces a
//!   new value.
//! - Membership is answered from the enumerated code units first, then from
//!   declared member namespaces. There is no predicate closure.

pub mod code_unit;
pub mod metadata;
pub mod registry;

use crate::module::code_unit::{CodeUnit, CodeUnitId};
use crate::module::metadata::{DependencyInfo, MetadataError, ModuleId, ModuleMetadata};
use semver::Version;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Handle to a module's non-code assets. Not interpreted by the core.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResourceSource {
    #[default]
    Empty,
    Directory(PathBuf),
    Archive(PathBuf),
}

/// Immutable description of one extension unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    metadata: ModuleMetadata,
    code_units: BTreeMap<CodeUnitId, CodeUnit>,
    member_namespaces: BTreeSet<String>,
    api_namespaces: BTreeSet<String>,
    api_units: BTreeSet<CodeUnitId>,
    resources: ResourceSource,
}

impl Module {
    pub fn builder(metadata: ModuleMetadata) -> ModuleBuilder {
        ModuleBuilder {
            metadata,
            code_units: Vec::new(),
            member_namespaces: BTreeSet::new(),
            api_namespaces: BTreeSet::new(),
            resources: ResourceSource::Empty,
        }
    }

    pub fn id(&self) -> ModuleId {
        self.metadata.id()
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn version(&self) -> &Version {
        &self.metadata.version
    }

    pub fn metadata(&self) -> &ModuleMetadata {
        &self.metadata
    }

    pub fn dependencies(&self) -> &[DependencyInfo] {
        &self.metadata.dependencies
    }

    pub fn resources(&self) -> &ResourceSource {
        &self.resources
    }

    pub fn code_units(&self) -> impl Iterator<Item = &CodeUnit> {
        self.code_units.values()
    }

    pub fn code_unit(&self, id: &CodeUnitId) -> Option<&CodeUnit> {
        self.code_units.get(id)
    }

    pub fn member_namespaces(&self) -> impl Iterator<Item = &str> {
        self.member_namespaces.iter().map(String::as_str)
    }

    /// Namespaces this module declares open for cross-module use.
    pub fn api_namespaces(&self) -> impl Iterator<Item = &str> {
        self.api_namespaces.iter().map(String::as_str)
    }

    /// Units carrying the API marker; computed once when the module is built.
    pub fn api_units(&self) -> impl Iterator<Item = &CodeUnitId> {
        self.api_units.iter()
    }

    /// Returns whether `unit` is explicitly enumerated by this module.
    pub fn contributes(&self, unit: &CodeUnitId) -> bool {
        self.code_units.contains_key(unit)
    }

    /// Membership test: enumerated units, then the member-namespace fallback.
    pub fn is_member(&self, unit: &CodeUnitId) -> bool {
        self.contributes(unit)
            || self
                .member_namespaces
                .iter()
                .any(|namespace| unit.is_within(namespace))
    }

    /// Returns a copy of this module with one more declared dependency.
    pub fn with_dependency(&self, dependency: DependencyInfo) -> Module {
        let mut rewritten = self.clone();
        rewritten.metadata.dependencies.push(dependency);
        rewritten
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name(), self.version())
    }
}

/// Builder that validates metadata and code unit declarations.
#[derive(Debug, Clone)]
pub struct ModuleBuilder {
    metadata: ModuleMetadata,
    code_units: Vec<CodeUnit>,
    member_namespaces: BTreeSet<String>,
    api_namespaces: BTreeSet<String>,
    resources: ResourceSource,
}

impl ModuleBuilder {
    pub fn code_unit(mut self, unit: CodeUnit) -> Self {
        self.code_units.push(unit);
        self
    }

    pub fn code_units(mut self, units: impl IntoIterator<Item = CodeUnit>) -> Self {
        self.code_units.extend(units);
        self
    }

    pub fn member_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.member_namespaces.insert(namespace.into());
        self
    }

    pub fn api_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.api_namespaces.insert(namespace.into());
        self
    }

    pub fn resources(mut self, resources: ResourceSource) -> Self {
        self.resources = resources;
        self
    }

    pub fn build(self) -> Result<Module, ModuleError> {
        self.metadata
            .validate()
            .map_err(ModuleError::InvalidMetadata)?;

        let mut code_units = BTreeMap::new();
        for unit in self.code_units {
            if unit.id.as_str().is_empty() || unit.id.as_str().split('.').any(str::is_empty) {
                return Err(ModuleError::InvalidCodeUnit(unit.id));
            }
            if code_units.contains_key(&unit.id) {
                return Err(ModuleError::DuplicateCodeUnit(unit.id));
            }
            code_units.insert(unit.id.clone(), unit);
        }

        let api_units = code_units
            .values()
            .filter(|unit| unit.api)
            .map(|unit| unit.id.clone())
            .collect();

        Ok(Module {
            metadata: self.metadata,
            code_units,
            member_namespaces: self.member_namespaces,
            api_namespaces: self.api_namespaces,
            api_units,
            resources: self.resources,
        })
    }
}

/// Module construction errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    InvalidMetadata(MetadataError),
    InvalidCodeUnit(CodeUnitId),
    DuplicateCodeUnit(CodeUnitId),
}

impl Display for ModuleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMetadata(err) => write!(f, "invalid module metadata: {err}"),
            Self::InvalidCodeUnit(unit) => write!(f, "code unit id is invalid: `{unit}`"),
            Self::DuplicateCodeUnit(unit) => {
                write!(f, "code unit declared more than once: {unit}")
            }
        }
    }
}

impl Error for ModuleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidMetadata(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Module, ModuleError};
    use crate::module::code_unit::{CodeUnit, CodeUnitId};
    use crate::module::metadata::{DependencyInfo, ModuleMetadata};
    use semver::Version;

    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new("Sample", Version::new(1, 0, 0))
    }

    #[test]
    fn caches_api_units_at_build_time() {
        let module = Module::builder(metadata())
            .code_unit(CodeUnit::new("sample.Public").as_api())
            .code_unit(CodeUnit::new("sample.internal.Hidden"))
            .build()
            .expect("module build");

        let api: Vec<&CodeUnitId> = module.api_units().collect();
        assert_eq!(api, vec![&CodeUnitId::new("sample.Public")]);
    }

    #[test]
    fn membership_falls_back_to_member_namespaces() {
        let module = Module::builder(metadata())
            .code_unit(CodeUnit::new("sample.Listed"))
            .member_namespace("sample.generated")
            .build()
            .expect("module build");

        assert!(module.contributes(&CodeUnitId::new("sample.Listed")));
        assert!(!module.contributes(&CodeUnitId::new("sample.generated.Proxy")));
        assert!(module.is_member(&CodeUnitId::new("sample.generated.Proxy")));
        assert!(!module.is_member(&CodeUnitId::new("sample.Other")));
    }

    #[test]
    fn rejects_duplicate_and_malformed_code_units() {
        let err = Module::builder(metadata())
            .code_unit(CodeUnit::new("sample.A"))
            .code_unit(CodeUnit::new("sample.A"))
            .build()
            .expect_err("duplicate unit must fail");
        assert_eq!(err, ModuleError::DuplicateCodeUnit(CodeUnitId::new("sample.A")));

        let err = Module::builder(metadata())
            .code_unit(CodeUnit::new("sample..A"))
            .build()
            .expect_err("empty segment must fail");
        assert!(matches!(err, ModuleError::InvalidCodeUnit(_)));
    }

    #[test]
    fn with_dependency_leaves_original_untouched() {
        let module = Module::builder(metadata()).build().expect("module build");
        let rewritten = module.with_dependency(DependencyInfo::any("engine"));

        assert!(module.dependencies().is_empty());
        assert_eq!(rewritten.dependencies().len(), 1);
        assert_eq!(rewritten.id(), module.id());
    }
}
