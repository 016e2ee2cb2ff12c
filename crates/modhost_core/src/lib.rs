//! Module host core: registry, dependency resolution, sandbox permissions
//! and loaded-environment composition for a pluggable application.

pub mod config;
pub mod discovery;
pub mod environment;
pub mod logging;
pub mod manager;
pub mod module;
pub mod resolver;
pub mod sandbox;

pub use config::{ConfigError, LoggingConfig, ManagerConfig, PermissionGrant, SandboxConfig};
pub use discovery::{DiscoveryError, ModuleSource, NoModules};
pub use environment::{EnvironmentError, ModuleEnvironment, Subtypes};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use manager::{ManagerError, ModuleManager};
pub use module::code_unit::{CodeUnit, CodeUnitId};
pub use module::metadata::{DependencyInfo, MetadataError, ModuleId, ModuleMetadata, VersionRange};
pub use module::registry::{ModuleRegistry, RegistryChange};
pub use module::{Module, ModuleBuilder, ModuleError, ResourceSource};
pub use resolver::{DependencyResolver, Requirement, Requirer, ResolutionError, ResolvedModules};
pub use sandbox::enforcer::SandboxEnforcer;
pub use sandbox::permission::{RuntimePermission, RuntimePermissionError};
pub use sandbox::permission_set::PermissionSet;
pub use sandbox::provider::{
    PermissionProvider, PermissionProviderFactory, SandboxMode, StandardPermissionProvider,
    WarnOnlyPermissionProvider,
};
pub use sandbox::SandboxError;
pub use semver::Version;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
