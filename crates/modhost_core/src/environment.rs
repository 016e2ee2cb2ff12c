//! Loaded module composition.
//!
//! # Responsibility
//! - Bind a module set into one immutable, queryable runtime object.
//! - Answer "who provides this unit", "what derives from this unit" and
//!   "in which order do modules initialize".
//!
//! # Invariants
//! - The host module is always present and always first in dependency order.
//! - Every enumerated code unit maps to exactly one module. Two modules
//!   enumerating the same unit, or a unit or member namespace falling inside
//!   another module's member namespace, is a construction error.
//! - Nothing changes after construction. Replacing an environment means
//!   building a new one.

use crate::module::code_unit::{namespace_ancestors, CodeUnitId};
use crate::module::Module;
use crate::sandbox::provider::{PermissionProvider, PermissionProviderFactory};
use log::{info, warn};
use semver::Version;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

/// Environment construction errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    /// Two versions of one name, or two different modules with one
    /// identity, in a single environment.
    DuplicateModule {
        name: String,
        first: Version,
        second: Version,
    },
    /// Two modules enumerate the same code unit, or a unit lies inside a
    /// member namespace of another module.
    OwnershipConflict {
        unit: CodeUnitId,
        first: String,
        second: String,
    },
    /// Two modules declare the same or nested member namespaces.
    NamespaceConflict {
        namespace: String,
        first: String,
        second: String,
    },
}

impl Display for EnvironmentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateModule {
                name,
                first,
                second,
            } if first == second => write!(
                f,
                "two different modules claim identity `{name}@{first}`"
            ),
            Self::DuplicateModule {
                name,
                first,
                second,
            } => write!(
                f,
                "module `{name}` appears twice in one environment ({first} and {second})"
            ),
            Self::OwnershipConflict {
                unit,
                first,
                second,
            } => write!(
                f,
                "code unit `{unit}` is provided by both `{first}` and `{second}`"
            ),
            Self::NamespaceConflict {
                namespace,
                first,
                second,
            } => write!(
                f,
                "namespace `{namespace}` is claimed by both `{first}` and `{second}`"
            ),
        }
    }
}

impl Error for EnvironmentError {}

/// Immutable composition of a module set.
#[derive(Debug)]
pub struct ModuleEnvironment {
    id: Uuid,
    host: Arc<Module>,
    modules: BTreeMap<String, Arc<Module>>,
    order: Vec<String>,
    unit_owners: BTreeMap<CodeUnitId, String>,
    namespace_owners: BTreeMap<String, String>,
    subtypes: BTreeMap<CodeUnitId, Vec<CodeUnitId>>,
    providers: BTreeMap<String, Arc<dyn PermissionProvider>>,
}

impl ModuleEnvironment {
    /// Builds an environment from `modules` plus the host module.
    ///
    /// Input order breaks ties between independent modules.
    pub fn new<I>(
        modules: I,
        host: Arc<Module>,
        factory: &dyn PermissionProviderFactory,
    ) -> Result<Self, EnvironmentError>
    where
        I: IntoIterator<Item = Arc<Module>>,
    {
        let mut ordered_input = vec![host.clone()];
        let mut by_name = BTreeMap::<String, Arc<Module>>::new();
        by_name.insert(host.name().to_string(), host.clone());

        for module in modules {
            match by_name.get(module.name()) {
                Some(existing) if Arc::ptr_eq(existing, &module) || **existing == *module => {
                    continue
                }
                Some(existing) => {
                    return Err(EnvironmentError::DuplicateModule {
                        name: module.name().to_string(),
                        first: existing.version().clone(),
                        second: module.version().clone(),
                    });
                }
                None => {
                    by_name.insert(module.name().to_string(), module.clone());
                    ordered_input.push(module);
                }
            }
        }

        let order = dependency_order(&ordered_input);

        let mut unit_owners = BTreeMap::<CodeUnitId, String>::new();
        let mut namespace_owners = BTreeMap::<String, String>::new();
        let mut subtypes = BTreeMap::<CodeUnitId, Vec<CodeUnitId>>::new();
        for name in &order {
            let Some(module) = by_name.get(name) else {
                continue;
            };
            for unit in module.code_units() {
                if let Some(first) = unit_owners.get(&unit.id) {
                    return Err(EnvironmentError::OwnershipConflict {
                        unit: unit.id.clone(),
                        first: first.clone(),
                        second: name.clone(),
                    });
                }
                unit_owners.insert(unit.id.clone(), name.clone());
                for supertype in &unit.supertypes {
                    subtypes
                        .entry(supertype.clone())
                        .or_default()
                        .push(unit.id.clone());
                }
            }
            for namespace in module.member_namespaces() {
                if let Some(first) = namespace_owners.get(namespace) {
                    return Err(EnvironmentError::NamespaceConflict {
                        namespace: namespace.to_string(),
                        first: first.clone(),
                        second: name.clone(),
                    });
                }
                namespace_owners.insert(namespace.to_string(), name.clone());
            }
        }
        check_namespace_shadowing(&unit_owners, &namespace_owners)?;

        let providers = by_name
            .iter()
            .map(|(name, module)| (name.clone(), factory.create_provider_for(module)))
            .collect();

        let environment = Self {
            id: Uuid::new_v4(),
            host,
            modules: by_name,
            order,
            unit_owners,
            namespace_owners,
            subtypes,
            providers,
        };
        info!(
            "event=environment_built module=environment status=ok env_id={} modules={} units={}",
            environment.id,
            environment.order.join(","),
            environment.unit_owners.len()
        );
        Ok(environment)
    }

    /// Unique id, for log correlation across environment replacements.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn host_module(&self) -> &Arc<Module> {
        &self.host
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Module>> {
        self.modules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Module names, each after every module it depends on.
    pub fn module_ids_ordered_by_dependencies(&self) -> &[String] {
        &self.order
    }

    /// Modules in dependency order.
    pub fn modules(&self) -> impl Iterator<Item = &Arc<Module>> {
        self.order.iter().filter_map(|name| self.modules.get(name))
    }

    /// Owning module of `unit`.
    ///
    /// Enumerated units win; otherwise the module declaring the innermost
    /// member namespace containing the unit owns it.
    pub fn module_providing(&self, unit: &CodeUnitId) -> Option<&Arc<Module>> {
        let owner = self.unit_owners.get(unit).or_else(|| {
            namespace_ancestors(unit.namespace())
                .find_map(|namespace| self.namespace_owners.get(namespace))
        })?;
        self.modules.get(owner)
    }

    /// Every contributed unit that transitively derives from `base`.
    pub fn subtypes_of(&self, base: &CodeUnitId) -> Subtypes<'_> {
        let mut subtypes = Subtypes {
            index: &self.subtypes,
            queue: VecDeque::new(),
            seen: BTreeSet::new(),
        };
        subtypes.enqueue_children(base);
        subtypes
    }

    pub fn permission_provider(&self, name: &str) -> Option<&Arc<dyn PermissionProvider>> {
        self.providers.get(name)
    }
}

/// Lazy breadth-first walk over the subtype index.
///
/// Call `ModuleEnvironment::subtypes_of` again to restart.
#[derive(Debug, Clone)]
pub struct Subtypes<'a> {
    index: &'a BTreeMap<CodeUnitId, Vec<CodeUnitId>>,
    queue: VecDeque<&'a CodeUnitId>,
    seen: BTreeSet<&'a CodeUnitId>,
}

impl<'a> Subtypes<'a> {
    fn enqueue_children(&mut self, parent: &CodeUnitId) {
        if let Some(children) = self.index.get(parent) {
            for child in children {
                if self.seen.insert(child) {
                    self.queue.push_back(child);
                }
            }
        }
    }
}

impl<'a> Iterator for Subtypes<'a> {
    type Item = &'a CodeUnitId;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.queue.pop_front()?;
        self.enqueue_children(next);
        Some(next)
    }
}

/// Rejects enumerated units and member namespaces that fall inside a member
/// namespace declared by a different module.
fn check_namespace_shadowing(
    unit_owners: &BTreeMap<CodeUnitId, String>,
    namespace_owners: &BTreeMap<String, String>,
) -> Result<(), EnvironmentError> {
    for (unit, owner) in unit_owners {
        for namespace in namespace_ancestors(unit.namespace()) {
            match namespace_owners.get(namespace) {
                Some(claimant) if claimant != owner => {
                    return Err(EnvironmentError::OwnershipConflict {
                        unit: unit.clone(),
                        first: claimant.clone(),
                        second: owner.clone(),
                    });
                }
                _ => {}
            }
        }
    }
    for (namespace, owner) in namespace_owners {
        for outer in namespace_ancestors(namespace).skip(1) {
            match namespace_owners.get(outer) {
                Some(claimant) if claimant != owner => {
                    return Err(EnvironmentError::NamespaceConflict {
                        namespace: namespace.clone(),
                        first: claimant.clone(),
                        second: owner.clone(),
                    });
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Topological order over strongly connected components.
///
/// `modules[0]` is the host: every other module implicitly depends on it and
/// its own declared dependencies are ignored, so it always comes first.
/// Independent components are placed in input order. Members of a
/// dependency cycle are placed together, in input order, after everything
/// the cycle depends on, and each cycle is logged.
fn dependency_order(modules: &[Arc<Module>]) -> Vec<String> {
    let index: BTreeMap<&str, usize> = modules
        .iter()
        .enumerate()
        .map(|(position, module)| (module.name(), position))
        .collect();

    let edges: Vec<BTreeSet<usize>> = modules
        .iter()
        .enumerate()
        .map(|(position, module)| {
            if position == 0 {
                return BTreeSet::new();
            }
            let mut deps: BTreeSet<usize> = module
                .dependencies()
                .iter()
                .filter_map(|dependency| index.get(dependency.name.as_str()).copied())
                .filter(|&target| target != position)
                .collect();
            deps.insert(0);
            deps
        })
        .collect();

    let components = StronglyConnected::components(&edges);
    let mut component_of = vec![0usize; modules.len()];
    for (component, members) in components.iter().enumerate() {
        for &member in members {
            component_of[member] = component;
        }
    }

    let mut pending = vec![0usize; components.len()];
    let mut dependents = vec![Vec::<usize>::new(); components.len()];
    for (component, members) in components.iter().enumerate() {
        let targets: BTreeSet<usize> = members
            .iter()
            .flat_map(|&member| edges[member].iter().map(|&dep| component_of[dep]))
            .filter(|&target| target != component)
            .collect();
        pending[component] = targets.len();
        for target in targets {
            dependents[target].push(component);
        }
    }

    // Keyed by the first member's input position.
    let mut ready: BTreeSet<(usize, usize)> = components
        .iter()
        .enumerate()
        .filter(|(component, _)| pending[*component] == 0)
        .map(|(component, members)| (members[0], component))
        .collect();
    let mut order = Vec::with_capacity(modules.len());

    while let Some((_, component)) = ready.pop_first() {
        let members = &components[component];
        if members.len() > 1 {
            warn!(
                "event=dependency_cycle module=environment status=warn members={}",
                members
                    .iter()
                    .map(|&member| modules[member].name())
                    .collect::<Vec<_>>()
                    .join(",")
            );
        }
        order.extend(members.iter().map(|&member| modules[member].name().to_string()));
        for &dependent in &dependents[component] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert((components[dependent][0], dependent));
            }
        }
    }
    order
}

/// Tarjan's algorithm. Each component lists its members in input order.
struct StronglyConnected<'g> {
    edges: &'g [BTreeSet<usize>],
    visit_index: Vec<Option<usize>>,
    low_link: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next_index: usize,
    components: Vec<Vec<usize>>,
}

impl<'g> StronglyConnected<'g> {
    fn components(edges: &'g [BTreeSet<usize>]) -> Vec<Vec<usize>> {
        let mut search = Self {
            edges,
            visit_index: vec![None; edges.len()],
            low_link: vec![0; edges.len()],
            on_stack: vec![false; edges.len()],
            stack: Vec::new(),
            next_index: 0,
            components: Vec::new(),
        };
        for node in 0..edges.len() {
            if search.visit_index[node].is_none() {
                search.visit(node);
            }
        }
        search.components
    }

    fn visit(&mut self, node: usize) {
        self.visit_index[node] = Some(self.next_index);
        self.low_link[node] = self.next_index;
        self.next_index += 1;
        self.stack.push(node);
        self.on_stack[node] = true;

        let edges = self.edges;
        for &next in &edges[node] {
            match self.visit_index[next] {
                None => {
                    self.visit(next);
                    self.low_link[node] = self.low_link[node].min(self.low_link[next]);
                }
                Some(next_index) if self.on_stack[next] => {
                    self.low_link[node] = self.low_link[node].min(next_index);
                }
                Some(_) => {}
            }
        }

        if self.visit_index[node] == Some(self.low_link[node]) {
            let mut members = Vec::new();
            while let Some(member) = self.stack.pop() {
                self.on_stack[member] = false;
                members.push(member);
                if member == node {
                    break;
                }
            }
            members.sort_unstable();
            self.components.push(members);
        }
    }
}
