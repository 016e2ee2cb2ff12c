//! Dependency resolution over the module registry.
//!
//! # Responsibility
//! - Turn a set of requested module names into a version-consistent,
//!   minimal module set, or report the unsatisfiable constraint.
//!
//! # Invariants
//! - Each name is assigned at most one version.
//! - Every non-optional dependency of an assigned module is assigned, and
//!   every constraint (optional ones included) holds for the assigned version.
//! - Only modules reachable from a request through non-optional dependency
//!   edges are assigned.
//! - Requested names are processed in sorted order, so the same registry and
//!   request always yield the same set.
//!
//! Resolution is a depth-first search: an unassigned name tries the versions
//! that satisfy every constraint seen so far, newest first. When a later
//! constraint rejects an assigned version, the search backtracks to the most
//! recent choice and tries its next candidate. The first complete assignment
//! found wins, so newer versions are preferred at every choice point.

use crate::module::metadata::{ModuleId, VersionRange};
use crate::module::registry::ModuleRegistry;
use crate::module::Module;
use log::{debug, info, warn};
use semver::Version;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Who asked for a name during resolution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Requirer {
    /// The caller's request.
    Request,
    Module(ModuleId),
}

impl Display for Requirer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Module(id) => write!(f, "{id}"),
        }
    }
}

/// One version constraint on a name, with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub requirer: Requirer,
    pub range: VersionRange,
}

impl Display for Requirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} requires {}", self.requirer, self.range)
    }
}

/// Resolution failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// A requested or depended-on name has no registered version.
    UnknownModule { name: String, required_by: Requirer },
    /// The accumulated constraints for `name` admit no common version.
    VersionConflict {
        name: String,
        requirements: Vec<Requirement>,
    },
}

impl ResolutionError {
    /// Name the failure is about.
    pub fn module_name(&self) -> &str {
        match self {
            Self::UnknownModule { name, .. } | Self::VersionConflict { name, .. } => name,
        }
    }
}

impl Display for ResolutionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownModule { name, required_by } => {
                write!(f, "unknown module `{name}` (required by {required_by})")
            }
            Self::VersionConflict { name, requirements } => {
                write!(f, "no version of `{name}` satisfies all constraints: ")?;
                for (index, requirement) in requirements.iter().enumerate() {
                    if index > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{requirement}")?;
                }
                Ok(())
            }
        }
    }
}

impl Error for ResolutionError {}

/// Successful resolution: one module per name, in the order they were assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModules {
    modules: Vec<Arc<Module>>,
}

impl ResolvedModules {
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Module>> {
        self.modules.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Module>> {
        self.modules.iter().find(|module| module.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Sorted identities of the resolved set.
    pub fn ids(&self) -> BTreeSet<ModuleId> {
        self.modules.iter().map(|module| module.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn into_vec(self) -> Vec<Arc<Module>> {
        self.modules
    }
}

impl IntoIterator for ResolvedModules {
    type Item = Arc<Module>;
    type IntoIter = std::vec::IntoIter<Arc<Module>>;

    fn into_iter(self) -> Self::IntoIter {
        self.modules.into_iter()
    }
}

/// Resolves requests against a read-only registry.
#[derive(Debug, Clone, Copy)]
pub struct DependencyResolver<'r> {
    registry: &'r ModuleRegistry,
}

impl<'r> DependencyResolver<'r> {
    pub fn new(registry: &'r ModuleRegistry) -> Self {
        Self { registry }
    }

    /// Resolves `requested` (order-insensitive, duplicates ignored).
    pub fn resolve<I, S>(&self, requested: I) -> Result<ResolvedModules, ResolutionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: BTreeSet<String> = requested
            .into_iter()
            .map(|name| name.as_ref().to_string())
            .collect();
        info!(
            "event=resolve_start module=resolver status=ok requested={}",
            names.iter().cloned().collect::<Vec<_>>().join(",")
        );

        for name in &names {
            if !self.registry.contains(name) {
                let err = ResolutionError::UnknownModule {
                    name: name.clone(),
                    required_by: Requirer::Request,
                };
                warn!("event=resolve_failed module=resolver status=error reason={err}");
                return Err(err);
            }
        }

        let mut initial = Partial::default();
        initial.pending = names
            .into_iter()
            .map(|name| Pending {
                name,
                requirement: Requirement {
                    requirer: Requirer::Request,
                    range: VersionRange::any(),
                },
                expand: true,
            })
            .collect();

        match self.search(initial) {
            Ok(resolved) => {
                let resolved = ResolvedModules {
                    modules: resolved.order,
                };
                info!(
                    "event=resolve_done module=resolver status=ok modules={}",
                    resolved.len()
                );
                Ok(resolved)
            }
            Err(err) => {
                warn!("event=resolve_failed module=resolver status=error reason={err}");
                Err(err)
            }
        }
    }

    /// Drains pending requirements until a version choice is needed, then
    /// tries each candidate newest-first on its own copy of the state.
    ///
    /// A failing candidate takes every assignment and constraint it caused
    /// with it; the next candidate starts from the state before the choice.
    fn search(&self, mut partial: Partial) -> Result<Partial, ResolutionError> {
        while let Some(next) = partial.pending.pop_front() {
            let Pending {
                name,
                requirement,
                expand,
            } = next;
            let requirer = requirement.requirer.clone();
            partial
                .requirements
                .entry(name.clone())
                .or_default()
                .push(requirement);

            if let Some(current) = partial.assigned.get(&name) {
                // Revisits (including cycles) never re-expand a satisfied name.
                if partial.admits(&name, current.version()) {
                    continue;
                }
                return Err(partial.conflict(&name));
            }
            if !expand {
                continue;
            }
            if !self.registry.contains(&name) {
                return Err(ResolutionError::UnknownModule {
                    name,
                    required_by: requirer,
                });
            }

            let candidates: Vec<&Arc<Module>> = self
                .registry
                .modules_named(&name)
                .filter(|module| partial.admits(&name, module.version()))
                .collect();
            let mut first_failure = None;
            for candidate in candidates {
                match self.search(partial.assign(candidate)) {
                    Ok(resolved) => return Ok(resolved),
                    Err(err) => {
                        debug!(
                            "event=resolve_backtrack module=resolver status=ok rejected={} reason={}",
                            candidate, err
                        );
                        first_failure.get_or_insert(err);
                    }
                }
            }
            return Err(first_failure.unwrap_or_else(|| partial.conflict(&name)));
        }
        Ok(partial)
    }
}

/// One requirement waiting to be applied.
#[derive(Debug, Clone)]
struct Pending {
    name: String,
    requirement: Requirement,
    expand: bool,
}

/// State of one search branch.
#[derive(Debug, Clone, Default)]
struct Partial {
    assigned: BTreeMap<String, Arc<Module>>,
    order: Vec<Arc<Module>>,
    requirements: BTreeMap<String, Vec<Requirement>>,
    pending: VecDeque<Pending>,
}

impl Partial {
    /// Copy of this branch with `module` assigned and its dependencies
    /// queued ahead of the remaining work.
    fn assign(&self, module: &Arc<Module>) -> Partial {
        let mut next = self.clone();
        next.assigned
            .insert(module.name().to_string(), module.clone());
        next.order.push(module.clone());

        let requirer = Requirer::Module(module.id());
        for dependency in module.dependencies().iter().rev() {
            next.pending.push_front(Pending {
                name: dependency.name.clone(),
                requirement: Requirement {
                    requirer: requirer.clone(),
                    range: dependency.version_range(),
                },
                expand: !dependency.optional,
            });
        }
        next
    }

    fn admits(&self, name: &str, version: &Version) -> bool {
        self.requirements.get(name).map_or(true, |list| {
            list.iter()
                .all(|requirement| requirement.range.contains(version))
        })
    }

    fn conflict(&self, name: &str) -> ResolutionError {
        ResolutionError::VersionConflict {
            name: name.to_string(),
            requirements: self.requirements.get(name).cloned().unwrap_or_default(),
        }
    }
}
