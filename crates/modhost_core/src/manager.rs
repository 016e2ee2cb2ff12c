//! Module manager: startup orchestration and environment replacement.
//!
//! # Responsibility
//! - Build and register the host module, then everything discovery finds.
//! - Make the host the root of every module's dependency graph.
//! - Own the permission set snapshot, the enforcement hook and the active
//!   environment.
//!
//! # Invariants
//! - A failed resolve or environment build never touches the active
//!   environment.
//! - The active environment is swapped as a whole `Arc`; readers holding the
//!   previous one keep a complete, valid object.
//! - No module other than the host may use the host's name.

use crate::config::{ConfigError, ManagerConfig};
use crate::discovery::{DiscoveryError, ModuleSource};
use crate::environment::{EnvironmentError, ModuleEnvironment};
use crate::module::metadata::DependencyInfo;
use crate::module::registry::{ModuleRegistry, RegistryChange};
use crate::module::{Module, ModuleBuilder, ModuleError};
use crate::resolver::{DependencyResolver, ResolutionError};
use crate::sandbox::enforcer::SandboxEnforcer;
use crate::sandbox::permission_set::PermissionSet;
use crate::sandbox::provider::{
    provider_factory, PermissionProvider, PermissionProviderFactory, SandboxMode,
};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Manager-level errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    Resolution(ResolutionError),
    Environment(EnvironmentError),
    Discovery(DiscoveryError),
    InvalidModule(ModuleError),
    Config(ConfigError),
    /// A non-host module tried to register under the host's name.
    ReservedName(String),
}

impl Display for ManagerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolution(err) => write!(f, "resolution failed: {err}"),
            Self::Environment(err) => write!(f, "environment construction failed: {err}"),
            Self::Discovery(err) => write!(f, "{err}"),
            Self::InvalidModule(err) => write!(f, "invalid module: {err}"),
            Self::Config(err) => write!(f, "invalid configuration: {err}"),
            Self::ReservedName(name) => {
                write!(f, "module name `{name}` is reserved for the host module")
            }
        }
    }
}

impl Error for ManagerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Resolution(err) => Some(err),
            Self::Environment(err) => Some(err),
            Self::Discovery(err) => Some(err),
            Self::InvalidModule(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::ReservedName(_) => None,
        }
    }
}

impl From<ResolutionError> for ManagerError {
    fn from(err: ResolutionError) -> Self {
        Self::Resolution(err)
    }
}

impl From<EnvironmentError> for ManagerError {
    fn from(err: EnvironmentError) -> Self {
        Self::Environment(err)
    }
}

impl From<DiscoveryError> for ManagerError {
    fn from(err: DiscoveryError) -> Self {
        Self::Discovery(err)
    }
}

impl From<ModuleError> for ManagerError {
    fn from(err: ModuleError) -> Self {
        Self::InvalidModule(err)
    }
}

impl From<ConfigError> for ManagerError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

#[derive(Debug)]
pub struct ModuleManager {
    config: ManagerConfig,
    registry: ModuleRegistry,
    host: Arc<Module>,
    permissions: Arc<PermissionSet>,
    factory: Arc<dyn PermissionProviderFactory>,
    enforcer: Arc<SandboxEnforcer>,
    environment: Arc<ModuleEnvironment>,
}

impl ModuleManager {
    /// Starts a manager with its own enforcement hook.
    ///
    /// `host` describes the embedding application's code; namespaces from
    /// `config.auxiliary_namespaces` are added to it before it is built.
    pub fn new<S>(
        config: ManagerConfig,
        host: ModuleBuilder,
        source: &S,
    ) -> Result<Self, ManagerError>
    where
        S: ModuleSource + ?Sized,
    {
        Self::with_enforcer(config, host, source, Arc::new(SandboxEnforcer::new()))
    }

    /// Starts a manager around a caller-supplied enforcement hook.
    pub fn with_enforcer<S>(
        config: ManagerConfig,
        host: ModuleBuilder,
        source: &S,
        enforcer: Arc<SandboxEnforcer>,
    ) -> Result<Self, ManagerError>
    where
        S: ModuleSource + ?Sized,
    {
        let host = config
            .auxiliary_namespaces
            .iter()
            .fold(host, |builder, namespace| builder.member_namespace(namespace.as_str()))
            .build()?;
        let host = Arc::new(host);

        let mut registry = ModuleRegistry::new();
        registry.add(host.clone());

        let discovered = source.discover()?;
        let discovered_count = discovered.len();
        for module in discovered {
            let module = ensure_depends_on_host(module, &host)?;
            registry.add(module);
        }

        let mode = config.sandbox_mode();
        let permissions = Arc::new(build_permission_set(&config, &registry));
        let factory = provider_factory(mode, permissions.clone());
        if !enforcer.install(mode) && enforcer.mode() != Some(mode) {
            warn!(
                "event=sandbox_hook_installed module=manager status=mismatch installed={:?} requested={:?}",
                enforcer.mode(),
                mode
            );
        }

        let environment = if config.startup_modules.is_empty() {
            ModuleEnvironment::new(Vec::<Arc<Module>>::new(), host.clone(), factory.as_ref())?
        } else {
            let resolved = DependencyResolver::new(&registry).resolve(
                config
                    .startup_modules
                    .iter()
                    .map(String::as_str)
                    .chain(std::iter::once(host.name())),
            )?;
            ModuleEnvironment::new(resolved.into_vec(), host.clone(), factory.as_ref())?
        };

        info!(
            "event=manager_started module=manager status=ok host={} discovered={} registered={} permissions={} mode={:?}",
            host,
            discovered_count,
            registry.len(),
            permissions.len(),
            mode
        );

        Ok(Self {
            config,
            registry,
            host,
            permissions,
            factory,
            enforcer,
            environment: Arc::new(environment),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn host_module(&self) -> &Arc<Module> {
        &self.host
    }

    /// Snapshot of the active environment.
    pub fn environment(&self) -> Arc<ModuleEnvironment> {
        self.environment.clone()
    }

    pub fn enforcer(&self) -> &Arc<SandboxEnforcer> {
        &self.enforcer
    }

    pub fn permission_set(&self) -> &Arc<PermissionSet> {
        &self.permissions
    }

    pub fn sandbox_mode(&self) -> SandboxMode {
        self.config.sandbox_mode()
    }

    /// Registers a module after startup.
    ///
    /// The module gains an implicit host dependency and its API surface is
    /// merged into a new permission snapshot. Environments built earlier keep
    /// the snapshot they were built with.
    ///
    /// Permissions are never revoked: when the module replaces one registered
    /// under the same identity, API entries of the replaced module stay in the
    /// snapshot.
    pub fn register_module(&mut self, module: Module) -> Result<RegistryChange, ManagerError> {
        let module = Arc::new(ensure_depends_on_host(module, &self.host)?);

        let mut permissions = (*self.permissions).clone();
        let merged = permissions.merge_module_api(&module);
        if merged > 0 {
            self.permissions = Arc::new(permissions);
            self.factory = provider_factory(self.sandbox_mode(), self.permissions.clone());
        }
        Ok(self.registry.add(module))
    }

    /// Resolves `names` (plus the host) and makes the result the active
    /// environment.
    pub fn resolve_and_load_environment<I, S>(
        &mut self,
        names: I,
    ) -> Result<Arc<ModuleEnvironment>, ManagerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut requested: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().to_string())
            .collect();
        requested.push(self.host.name().to_string());

        let resolved = DependencyResolver::new(&self.registry)
            .resolve(&requested)
            .map_err(|err| {
                warn!(
                    "event=environment_load module=manager status=error module_name={} reason={}",
                    err.module_name(),
                    err
                );
                ManagerError::from(err)
            })?;
        self.load_environment(resolved.into_vec(), true)
    }

    /// Builds an environment from a manually assembled module set.
    ///
    /// The result replaces the active environment only when `as_primary`.
    pub fn load_environment<I>(
        &mut self,
        modules: I,
        as_primary: bool,
    ) -> Result<Arc<ModuleEnvironment>, ManagerError>
    where
        I: IntoIterator<Item = Arc<Module>>,
    {
        let environment = Arc::new(ModuleEnvironment::new(
            modules,
            self.host.clone(),
            self.factory.as_ref(),
        )?);
        if as_primary {
            info!(
                "event=environment_swap module=manager status=ok previous={} current={}",
                self.environment.id(),
                environment.id()
            );
            self.environment = environment.clone();
        }
        Ok(environment)
    }

    /// Provider for `module`, which need not be part of any environment.
    pub fn permission_provider(&self, module: &Arc<Module>) -> Arc<dyn PermissionProvider> {
        self.factory.create_provider_for(module)
    }
}

/// Adds a dependency on the host unless the module already declares one or
/// the host itself depends on the module.
fn ensure_depends_on_host(module: Module, host: &Module) -> Result<Module, ManagerError> {
    if module.name() == host.name() {
        return Err(ManagerError::ReservedName(module.name().to_string()));
    }
    if module.metadata().depends_on(host.name()) || host.metadata().depends_on(module.name()) {
        return Ok(module);
    }
    Ok(module.with_dependency(DependencyInfo::at_least(
        host.name(),
        host.version().clone(),
    )))
}

fn build_permission_set(config: &ManagerConfig, registry: &ModuleRegistry) -> PermissionSet {
    let mut set = config.sandbox.base_permission_set();
    let merged: usize = registry
        .modules()
        .map(|module| set.merge_module_api(module))
        .sum();
    info!(
        "event=sandbox_setup module=manager status=ok api_entries={} total={}",
        merged,
        set.len()
    );
    set
}
