//! Core capability whitelist, independent of any module.

use crate::sandbox::permission_set::PermissionSet;

/// Namespaces every sandboxed module may use.
pub const DEFAULT_API_NAMESPACES: &[&str] = &[
    "std.cmp",
    "std.collections",
    "std.convert",
    "std.fmt",
    "std.iter",
    "std.num",
    "std.option",
    "std.result",
    "std.str",
    "std.string",
    "std.time",
];

/// Individual units every sandboxed module may use.
pub const DEFAULT_API_UNITS: &[&str] = &[
    "std.sync.Arc",
    "std.sync.Mutex",
    "std.sync.RwLock",
    "std.io.Error",
    "std.io.ErrorKind",
    "std.path.Path",
    "std.path.PathBuf",
];

/// Adds the default whitelist to `set`.
pub fn apply_default_whitelist(set: &mut PermissionSet) {
    for namespace in DEFAULT_API_NAMESPACES {
        set.add_api_namespace(*namespace);
    }
    for unit in DEFAULT_API_UNITS {
        set.add_api_unit(*unit);
    }
}
