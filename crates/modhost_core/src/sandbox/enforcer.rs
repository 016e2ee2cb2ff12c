//! Enforcement hook consulted before sandboxed code uses a capability.
//!
//! # Invariants
//! - `install` takes effect at most once per enforcer; there is no uninstall.
//! - Before installation every check passes. A missing hook weakens
//!   enforcement but never fails resolution or environment construction.
//! - Host code is not sandboxed.

use crate::environment::ModuleEnvironment;
use crate::module::code_unit::CodeUnitId;
use crate::sandbox::permission::RuntimePermission;
use crate::sandbox::provider::{PermissionProvider, SandboxMode};
use crate::sandbox::SandboxError;
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Injectable enforcement policy, owned by the module manager.
#[derive(Debug, Default)]
pub struct SandboxEnforcer {
    installed: OnceCell<SandboxMode>,
}

impl SandboxEnforcer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the hook. Returns `true` only for the call that installed it.
    pub fn install(&self, mode: SandboxMode) -> bool {
        let installed = self.installed.set(mode).is_ok();
        if installed {
            info!(
                "event=sandbox_hook_installed module=sandbox status=ok mode={:?}",
                mode
            );
        } else {
            debug!("event=sandbox_hook_installed module=sandbox status=unchanged");
        }
        installed
    }

    pub fn is_installed(&self) -> bool {
        self.installed.get().is_some()
    }

    /// Mode recorded at installation.
    pub fn mode(&self) -> Option<SandboxMode> {
        self.installed.get().copied()
    }

    /// Checks that `caller`'s sandboxed code may use `unit`.
    pub fn check_use(
        &self,
        environment: &ModuleEnvironment,
        caller: &str,
        unit: &CodeUnitId,
    ) -> Result<(), SandboxError> {
        let Some(provider) = self.provider_for(environment, caller)? else {
            return Ok(());
        };
        if provider.is_permitted(unit) {
            return Ok(());
        }
        warn!(
            "event=sandbox_denied module=sandbox status=error caller={} unit={}",
            caller, unit
        );
        Err(SandboxError::PermissionDenied {
            module: caller.to_string(),
            unit: unit.clone(),
            permission: None,
        })
    }

    /// Checks a reflective or filesystem-sensitive operation issued from
    /// `origin`, a unit of `caller`.
    pub fn check_permission(
        &self,
        environment: &ModuleEnvironment,
        caller: &str,
        origin: &CodeUnitId,
        permission: RuntimePermission,
    ) -> Result<(), SandboxError> {
        let Some(provider) = self.provider_for(environment, caller)? else {
            return Ok(());
        };
        if provider.has_permission(origin, permission) {
            return Ok(());
        }
        warn!(
            "event=sandbox_denied module=sandbox status=error caller={} unit={} permission={}",
            caller, origin, permission
        );
        Err(SandboxError::PermissionDenied {
            module: caller.to_string(),
            unit: origin.clone(),
            permission: Some(permission),
        })
    }

    /// `None` when the check does not apply (hook missing or host caller).
    fn provider_for(
        &self,
        environment: &ModuleEnvironment,
        caller: &str,
    ) -> Result<Option<Arc<dyn PermissionProvider>>, SandboxError> {
        if !self.is_installed() {
            debug!(
                "event=sandbox_check module=sandbox status=skipped reason=hook_not_installed caller={}",
                caller
            );
            return Ok(None);
        }
        if environment.host_module().name() == caller {
            return Ok(None);
        }
        environment
            .permission_provider(caller)
            .cloned()
            .map(Some)
            .ok_or_else(|| SandboxError::UnknownCaller(caller.to_string()))
    }
}
