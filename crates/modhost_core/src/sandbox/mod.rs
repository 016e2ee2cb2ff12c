//! Sandbox: permission set, per-module providers and the enforcement hook.
//!
//! # Responsibility
//! - Hold the capability whitelist shared by every environment.
//! - Decide, per module, whether sandboxed code may use a code unit or a
//!   runtime permission.
//!
//! # Invariants
//! - Strict providers deny anything outside the permission set; permissive
//!   providers log the same decision and allow.
//! - `PermissionDenied` is raised at the point of use, never at load time.

pub mod enforcer;
pub mod permission;
pub mod permission_set;
pub mod provider;
pub mod whitelist;

use crate::module::code_unit::CodeUnitId;
use crate::sandbox::permission::RuntimePermission;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Point-of-use sandbox errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxError {
    /// Sandboxed code tried to use a unit or permission it was not granted.
    PermissionDenied {
        module: String,
        unit: CodeUnitId,
        permission: Option<RuntimePermission>,
    },
    /// The calling module is not part of the environment being checked.
    UnknownCaller(String),
}

impl Display for SandboxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied {
                module,
                unit,
                permission: None,
            } => write!(f, "module `{module}` is not permitted to use `{unit}`"),
            Self::PermissionDenied {
                module,
                unit,
                permission: Some(permission),
            } => write!(
                f,
                "module `{module}` lacks permission `{permission}` for `{unit}`"
            ),
            Self::UnknownCaller(module) => {
                write!(f, "calling module is not in the environment: {module}")
            }
        }
    }
}

impl Error for SandboxError {}
