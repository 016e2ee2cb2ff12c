//! Runtime permission declarations for sandboxed code.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Runtime permission that can be granted to a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimePermission {
    Reflection,
    FileRead,
    FileWrite,
    Network,
    Process,
}

impl RuntimePermission {
    /// Stable string id used in configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reflection => RUNTIME_PERMISSION_REFLECTION,
            Self::FileRead => RUNTIME_PERMISSION_FILE_READ,
            Self::FileWrite => RUNTIME_PERMISSION_FILE_WRITE,
            Self::Network => RUNTIME_PERMISSION_NETWORK,
            Self::Process => RUNTIME_PERMISSION_PROCESS,
        }
    }

    /// User-facing short description.
    pub fn description(self) -> &'static str {
        match self {
            Self::Reflection => "Allow reflective access to private members of other code units.",
            Self::FileRead => "Allow reading files outside the module's own resources.",
            Self::FileWrite => "Allow creating or modifying files on the local file system.",
            Self::Network => "Allow opening network connections.",
            Self::Process => "Allow spawning or signalling operating system processes.",
        }
    }
}

impl Display for RuntimePermission {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const RUNTIME_PERMISSION_REFLECTION: &str = "reflection";
pub const RUNTIME_PERMISSION_FILE_READ: &str = "file_read";
pub const RUNTIME_PERMISSION_FILE_WRITE: &str = "file_write";
pub const RUNTIME_PERMISSION_NETWORK: &str = "network";
pub const RUNTIME_PERMISSION_PROCESS: &str = "process";

const SUPPORTED_RUNTIME_PERMISSION_STRINGS: &[&str] = &[
    RUNTIME_PERMISSION_REFLECTION,
    RUNTIME_PERMISSION_FILE_READ,
    RUNTIME_PERMISSION_FILE_WRITE,
    RUNTIME_PERMISSION_NETWORK,
    RUNTIME_PERMISSION_PROCESS,
];

/// Returns supported runtime permission strings.
pub fn supported_runtime_permission_strings() -> &'static [&'static str] {
    SUPPORTED_RUNTIME_PERMISSION_STRINGS
}

/// Parses one runtime permission from its configuration string.
pub fn parse_runtime_permission(value: &str) -> Result<RuntimePermission, RuntimePermissionError> {
    let normalized = value.trim();
    if normalized.is_empty() {
        return Err(RuntimePermissionError::EmptyPermission);
    }

    match normalized {
        RUNTIME_PERMISSION_REFLECTION => Ok(RuntimePermission::Reflection),
        RUNTIME_PERMISSION_FILE_READ => Ok(RuntimePermission::FileRead),
        RUNTIME_PERMISSION_FILE_WRITE => Ok(RuntimePermission::FileWrite),
        RUNTIME_PERMISSION_NETWORK => Ok(RuntimePermission::Network),
        RUNTIME_PERMISSION_PROCESS => Ok(RuntimePermission::Process),
        other => Err(RuntimePermissionError::UnsupportedPermission(
            other.to_string(),
        )),
    }
}

/// Runtime permission parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimePermissionError {
    EmptyPermission,
    UnsupportedPermission(String),
}

impl Display for RuntimePermissionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyPermission => write!(f, "runtime permission value must not be empty"),
            Self::UnsupportedPermission(value) => {
                write!(f, "runtime permission is unsupported: {value}")
            }
        }
    }
}

impl Error for RuntimePermissionError {}
