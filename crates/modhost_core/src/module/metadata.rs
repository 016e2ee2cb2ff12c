//! Module metadata declaration and validation.
//!
//! # Responsibility
//! - Describe one module's identity and declared dependencies.
//! - Validate declaration-level invariants before a module is registered.
//!
//! # Invariants
//! - Module names are case-sensitive tokens.
//! - A dependency without bounds matches any version.
//! - A dependency with only a lower bound gets an implicit exclusive upper
//!   bound at the next major version (next minor for `0.x`).

use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

static MODULE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_.\-]*$").expect("valid module name regex"));

/// Returns whether `value` is an acceptable module name.
pub fn is_valid_module_name(value: &str) -> bool {
    MODULE_NAME_RE.is_match(value) && !value.ends_with('.') && !value.contains("..")
}

/// Name plus version; the identity of one registered module.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId {
    pub name: String,
    pub version: Version,
}

impl ModuleId {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl Display for ModuleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Half-open version interval `[min, max)`; missing bounds are unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionRange {
    pub min: Option<Version>,
    pub max: Option<Version>,
}

impl VersionRange {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn contains(&self, version: &Version) -> bool {
        if let Some(min) = &self.min {
            if version < min {
                return false;
            }
        }
        if let Some(max) = &self.max {
            if version >= max {
                return false;
            }
        }
        true
    }
}

impl Display for VersionRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (&self.min, &self.max) {
            (None, None) => write!(f, "*"),
            (Some(min), None) => write!(f, ">={min}"),
            (None, Some(max)) => write!(f, "<{max}"),
            (Some(min), Some(max)) => write!(f, ">={min}, <{max}"),
        }
    }
}

/// One declared dependency of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyInfo {
    pub name: String,
    #[serde(default)]
    pub min_version: Option<Version>,
    /// Exclusive upper bound.
    #[serde(default)]
    pub max_version: Option<Version>,
    /// Optional dependencies constrain the version when present but never
    /// pull a module into a resolution on their own.
    #[serde(default)]
    pub optional: bool,
}

impl DependencyInfo {
    /// Dependency on any version of `name`.
    pub fn any(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_version: None,
            max_version: None,
            optional: false,
        }
    }

    /// Dependency on `name` at `min` or later within the same compatibility line.
    pub fn at_least(name: impl Into<String>, min: Version) -> Self {
        Self {
            min_version: Some(min),
            ..Self::any(name)
        }
    }

    /// Dependency on `name` in `[min, max)`.
    pub fn between(name: impl Into<String>, min: Version, max: Version) -> Self {
        Self {
            min_version: Some(min),
            max_version: Some(max),
            ..Self::any(name)
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Effective version interval, including the implicit upper bound.
    pub fn version_range(&self) -> VersionRange {
        let max = match (&self.min_version, &self.max_version) {
            (_, Some(max)) => Some(max.clone()),
            (Some(min), None) => Some(implicit_upper_bound(min)),
            (None, None) => None,
        };
        VersionRange {
            min: self.min_version.clone(),
            max,
        }
    }
}

fn implicit_upper_bound(min: &Version) -> Version {
    if min.major == 0 {
        Version::new(0, min.minor + 1, 0)
    } else {
        Version::new(min.major + 1, 0, 0)
    }
}

/// Declarative module metadata, as produced by the metadata collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    pub name: String,
    pub version: Version,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<DependencyInfo>,
}

impl ModuleMetadata {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            display_name: None,
            description: None,
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependency(mut self, dependency: DependencyInfo) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn id(&self) -> ModuleId {
        ModuleId::new(self.name.clone(), self.version.clone())
    }

    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.iter().any(|dep| dep.name == name)
    }

    /// Validates declaration-level metadata invariants.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.name.trim().is_empty() {
            return Err(MetadataError::EmptyName);
        }
        if !is_valid_module_name(&self.name) {
            return Err(MetadataError::InvalidName(self.name.clone()));
        }

        let mut seen = BTreeSet::<&str>::new();
        for dependency in &self.dependencies {
            if !is_valid_module_name(&dependency.name) {
                return Err(MetadataError::InvalidName(dependency.name.clone()));
            }
            if dependency.name == self.name {
                return Err(MetadataError::SelfDependency(self.name.clone()));
            }
            if !seen.insert(dependency.name.as_str()) {
                return Err(MetadataError::DuplicateDependency(dependency.name.clone()));
            }
            if let (Some(min), Some(max)) = (&dependency.min_version, &dependency.max_version) {
                if min >= max {
                    return Err(MetadataError::EmptyVersionRange {
                        dependency: dependency.name.clone(),
                        range: dependency.version_range().to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Metadata validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    EmptyName,
    InvalidName(String),
    SelfDependency(String),
    DuplicateDependency(String),
    EmptyVersionRange { dependency: String, range: String },
}

impl Display for MetadataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "module name must not be empty"),
            Self::InvalidName(value) => write!(f, "module name is invalid: {value}"),
            Self::SelfDependency(value) => write!(f, "module depends on itself: {value}"),
            Self::DuplicateDependency(value) => {
                write!(f, "dependency declared more than once: {value}")
            }
            Self::EmptyVersionRange { dependency, range } => {
                write!(f, "dependency `{dependency}` has an empty version range ({range})")
            }
        }
    }
}

impl Error for MetadataError {}
