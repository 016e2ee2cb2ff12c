//! Runtime configuration for the module manager and logging.
//!
//! # Responsibility
//! - Carry the strict/permissive sandbox switch and sandbox whitelist extras.
//! - Overlay process environment variables onto deserialized defaults.
//!
//! # Invariants
//! - Only a case-insensitive `true` enables permissive security; any other
//!   value (including malformed ones) keeps strict sandboxing.

use crate::logging::default_log_level;
use crate::sandbox::permission::{parse_runtime_permission, RuntimePermission, RuntimePermissionError};
use crate::sandbox::permission_set::PermissionSet;
use crate::sandbox::provider::SandboxMode;
use crate::sandbox::whitelist::apply_default_whitelist;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Boolean switch selecting warn-only sandboxing.
pub const PERMISSIVE_SECURITY_ENV: &str = "MODHOST_PERMISSIVE_SECURITY";
/// Extra grants, `namespace=permission` pairs separated by commas.
pub const PERMISSION_GRANTS_ENV: &str = "MODHOST_PERMISSION_GRANTS";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub permissive_security: bool,
    /// Modules resolved into the initial environment besides the host.
    pub startup_modules: Vec<String>,
    /// Extra namespaces whose code counts as part of the host module.
    pub auxiliary_namespaces: Vec<String>,
    pub sandbox: SandboxConfig,
}

impl ManagerConfig {
    /// Defaults with process environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(
            std::env::var(PERMISSIVE_SECURITY_ENV).ok().as_deref(),
            std::env::var(PERMISSION_GRANTS_ENV).ok().as_deref(),
        )
    }

    fn with_overrides(
        mut self,
        permissive: Option<&str>,
        grants: Option<&str>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = permissive {
            self.permissive_security = parse_bool_switch(value);
        }
        if let Some(value) = grants {
            for entry in value.split(',').filter(|entry| !entry.trim().is_empty()) {
                self.sandbox.grants.push(parse_grant(entry)?);
            }
        }
        Ok(self)
    }

    pub fn sandbox_mode(&self) -> SandboxMode {
        SandboxMode::from_permissive_flag(self.permissive_security)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub include_default_whitelist: bool,
    pub api_units: Vec<String>,
    pub api_namespaces: Vec<String>,
    pub grants: Vec<PermissionGrant>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            include_default_whitelist: true,
            api_units: Vec::new(),
            api_namespaces: Vec::new(),
            grants: Vec::new(),
        }
    }
}

impl SandboxConfig {
    /// Permission set before any module API surface is merged.
    pub fn base_permission_set(&self) -> PermissionSet {
        let mut set = PermissionSet::new();
        if self.include_default_whitelist {
            apply_default_whitelist(&mut set);
        }
        for unit in &self.api_units {
            set.add_api_unit(unit.as_str());
        }
        for namespace in &self.api_namespaces {
            set.add_api_namespace(namespace.as_str());
        }
        for grant in &self.grants {
            set.grant_permission(grant.namespace.as_str(), grant.permission);
        }
        set
    }
}

/// One runtime permission granted to a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub namespace: String,
    pub permission: RuntimePermission,
}

/// Parses `namespace=permission`.
pub fn parse_grant(value: &str) -> Result<PermissionGrant, ConfigError> {
    let Some((namespace, permission)) = value.split_once('=') else {
        return Err(ConfigError::MalformedGrant(value.trim().to_string()));
    };
    let namespace = namespace.trim();
    if namespace.is_empty() {
        return Err(ConfigError::MalformedGrant(value.trim().to_string()));
    }
    let permission = parse_runtime_permission(permission).map_err(ConfigError::Permission)?;
    Ok(PermissionGrant {
        namespace: namespace.to_string(),
        permission,
    })
}

fn parse_bool_switch(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Logging bootstrap settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute directory for rolling log files.
    pub log_dir: PathBuf,
}

impl LoggingConfig {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            level: default_log_level().to_string(),
            log_dir: log_dir.into(),
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MalformedGrant(String),
    Permission(RuntimePermissionError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedGrant(value) => {
                write!(f, "permission grant must be `namespace=permission`: `{value}`")
            }
            Self::Permission(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Permission(err) => Some(err),
            Self::MalformedGrant(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_grant, ConfigError, ManagerConfig};
    use crate::module::code_unit::CodeUnitId;
    use crate::sandbox::permission::RuntimePermission;
    use crate::sandbox::provider::SandboxMode;

    #[test]
    fn defaults_are_strict_with_default_whitelist() {
        let config = ManagerConfig::default();
        assert!(!config.permissive_security);
        assert_eq!(config.sandbox_mode(), SandboxMode::Strict);

        let set = config.sandbox.base_permission_set();
        assert!(set.is_permitted(&CodeUnitId::new("std.collections.BTreeMap")));
    }

    #[test]
    fn permissive_switch_accepts_only_true() {
        for (value, expected) in [
            ("true", true),
            ("TRUE", true),
            (" True ", true),
            ("1", false),
            ("yes", false),
            ("", false),
        ] {
            let config = ManagerConfig::default()
                .with_overrides(Some(value), None)
                .expect("override");
            assert_eq!(config.permissive_security, expected, "value `{value}`");
        }
    }

    #[test]
    fn parses_grant_overrides() {
        let config = ManagerConfig::default()
            .with_overrides(None, Some("lib.json=reflection, tools.io=file_write"))
            .expect("grants");
        assert_eq!(config.sandbox.grants.len(), 2);

        let set = config.sandbox.base_permission_set();
        assert!(set.has_permission("lib.json.internal", RuntimePermission::Reflection));
        assert!(set.has_permission("tools.io", RuntimePermission::FileWrite));
    }

    #[test]
    fn rejects_malformed_grants() {
        assert!(matches!(
            parse_grant("no-separator"),
            Err(ConfigError::MalformedGrant(_))
        ));
        assert!(matches!(
            parse_grant("=reflection"),
            Err(ConfigError::MalformedGrant(_))
        ));
        assert!(matches!(
            parse_grant("lib=teleport"),
            Err(ConfigError::Permission(_))
        ));
    }

    #[test]
    fn deserializes_partial_config() {
        let config: ManagerConfig = serde_json::from_str(
            r#"{
                "permissive_security": true,
                "sandbox": {
                    "include_default_whitelist": false,
                    "grants": [{ "namespace": "lib.json", "permission": "reflection" }]
                }
            }"#,
        )
        .expect("config json");

        assert!(config.permissive_security);
        assert!(config.startup_modules.is_empty());
        assert!(!config.sandbox.include_default_whitelist);
        assert!(config
            .sandbox
            .base_permission_set()
            .has_permission("lib.json", RuntimePermission::Reflection));
    }
}
