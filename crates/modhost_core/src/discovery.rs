//! Discovery collaborator contract.
//!
//! Scanning archives or directories and parsing metadata happen outside the
//! core. The manager only consumes the modules a source hands over.

use crate::module::Module;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Supplies modules to register at startup.
pub trait ModuleSource {
    fn discover(&self) -> Result<Vec<Module>, DiscoveryError>;
}

impl ModuleSource for Vec<Module> {
    fn discover(&self) -> Result<Vec<Module>, DiscoveryError> {
        Ok(self.clone())
    }
}

impl ModuleSource for [Module] {
    fn discover(&self) -> Result<Vec<Module>, DiscoveryError> {
        Ok(self.to_vec())
    }
}

/// Source that finds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoModules;

impl ModuleSource for NoModules {
    fn discover(&self) -> Result<Vec<Module>, DiscoveryError> {
        Ok(Vec::new())
    }
}

/// Failure reported by a discovery collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryError {
    pub location: String,
    pub reason: String,
}

impl DiscoveryError {
    pub fn new(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            reason: reason.into(),
        }
    }
}

impl Display for DiscoveryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "module discovery failed at `{}`: {}", self.location, self.reason)
    }
}

impl Error for DiscoveryError {}
