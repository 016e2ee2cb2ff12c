//! Per-module permission providers.
//!
//! Membership ("who owns this unit") and permission ("who may use it") are
//! separate axes: providers only answer the second one.

use crate::module::code_unit::CodeUnitId;
use crate::module::Module;
use crate::sandbox::permission::RuntimePermission;
use crate::sandbox::permission_set::PermissionSet;
use log::warn;
use std::fmt::Debug;
use std::sync::Arc;

/// Answers whether sandboxed code of one module may use a unit.
pub trait PermissionProvider: Debug + Send + Sync {
    fn is_permitted(&self, unit: &CodeUnitId) -> bool;

    /// Whether code living in `caller`'s namespace holds `permission`.
    fn has_permission(&self, caller: &CodeUnitId, permission: RuntimePermission) -> bool;
}

/// Builds one provider per module.
pub trait PermissionProviderFactory: Debug + Send + Sync {
    fn create_provider_for(&self, module: &Arc<Module>) -> Arc<dyn PermissionProvider>;
}

/// Strict sandboxing vs. log-and-allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxMode {
    Strict,
    Permissive,
}

impl SandboxMode {
    pub fn from_permissive_flag(permissive: bool) -> Self {
        if permissive {
            Self::Permissive
        } else {
            Self::Strict
        }
    }
}

/// Returns the factory for `mode` over a permission snapshot.
pub fn provider_factory(
    mode: SandboxMode,
    permissions: Arc<PermissionSet>,
) -> Arc<dyn PermissionProviderFactory> {
    let standard: Arc<dyn PermissionProviderFactory> =
        Arc::new(StandardPermissionProviderFactory::new(permissions));
    match mode {
        SandboxMode::Strict => standard,
        SandboxMode::Permissive => Arc::new(WarnOnlyProviderFactory::new(standard)),
    }
}

/// Denies everything outside the permission set and the module's own code.
#[derive(Debug, Clone)]
pub struct StandardPermissionProvider {
    module: Arc<Module>,
    permissions: Arc<PermissionSet>,
}

impl StandardPermissionProvider {
    pub fn new(module: Arc<Module>, permissions: Arc<PermissionSet>) -> Self {
        Self {
            module,
            permissions,
        }
    }
}

impl PermissionProvider for StandardPermissionProvider {
    fn is_permitted(&self, unit: &CodeUnitId) -> bool {
        self.permissions.is_permitted(unit) || self.module.is_member(unit)
    }

    fn has_permission(&self, caller: &CodeUnitId, permission: RuntimePermission) -> bool {
        self.permissions
            .has_permission(caller.namespace(), permission)
    }
}

#[derive(Debug, Clone)]
pub struct StandardPermissionProviderFactory {
    permissions: Arc<PermissionSet>,
}

impl StandardPermissionProviderFactory {
    pub fn new(permissions: Arc<PermissionSet>) -> Self {
        Self { permissions }
    }

    pub fn permission_set(&self) -> &Arc<PermissionSet> {
        &self.permissions
    }
}

impl PermissionProviderFactory for StandardPermissionProviderFactory {
    fn create_provider_for(&self, module: &Arc<Module>) -> Arc<dyn PermissionProvider> {
        Arc::new(StandardPermissionProvider::new(
            module.clone(),
            self.permissions.clone(),
        ))
    }
}

/// Logs what the wrapped provider would deny, then allows it.
#[derive(Debug, Clone)]
pub struct WarnOnlyPermissionProvider {
    module: String,
    inner: Arc<dyn PermissionProvider>,
}

impl WarnOnlyPermissionProvider {
    pub fn new(module: impl Into<String>, inner: Arc<dyn PermissionProvider>) -> Self {
        Self {
            module: module.into(),
            inner,
        }
    }
}

impl PermissionProvider for WarnOnlyPermissionProvider {
    fn is_permitted(&self, unit: &CodeUnitId) -> bool {
        if !self.inner.is_permitted(unit) {
            warn!(
                "event=sandbox_would_deny module=sandbox status=warn caller={} unit={}",
                self.module, unit
            );
        }
        true
    }

    fn has_permission(&self, caller: &CodeUnitId, permission: RuntimePermission) -> bool {
        if !self.inner.has_permission(caller, permission) {
            warn!(
                "event=sandbox_would_deny module=sandbox status=warn caller={} unit={} permission={}",
                self.module, caller, permission
            );
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct WarnOnlyProviderFactory {
    inner: Arc<dyn PermissionProviderFactory>,
}

impl WarnOnlyProviderFactory {
    pub fn new(inner: Arc<dyn PermissionProviderFactory>) -> Self {
        Self { inner }
    }
}

impl PermissionProviderFactory for WarnOnlyProviderFactory {
    fn create_provider_for(&self, module: &Arc<Module>) -> Arc<dyn PermissionProvider> {
        Arc::new(WarnOnlyPermissionProvider::new(
            module.name(),
            self.inner.create_provider_for(module),
        ))
    }
}
