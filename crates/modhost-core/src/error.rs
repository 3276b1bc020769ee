//! Error taxonomy for the registry.

use std::path::PathBuf;

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, PluginError>;

/// Plugin error types.
///
/// During a scan, every per-candidate failure (`LoadFailed`,
/// `EntryPointMissing`, `AbiMismatch`, `InvalidDescriptor`) is
/// recoverable: the candidate contributes nothing and the scan moves
/// on. Only `DuplicateStaticPlugin` and `NotFound` reach callers.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// A candidate file could not be loaded as a module.
    #[error("failed to load module {path:?}: {reason}")]
    LoadFailed { path: PathBuf, reason: String },

    /// A loaded module lacks the well-known entry point symbol.
    #[error("module {path:?} has no plugin entry point: {reason}")]
    EntryPointMissing { path: PathBuf, reason: String },

    /// A module was built against an incompatible ABI version.
    #[error("module {path:?} declares ABI version {found}, host supports {expected}")]
    AbiMismatch {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    /// A module's entry point produced a descriptor the host cannot use.
    #[error("invalid plugin descriptor in {path:?}: {reason}")]
    InvalidDescriptor { path: PathBuf, reason: String },

    /// A different static plugin is already registered under this pair.
    #[error("static plugin already registered for ({iid}, {id})")]
    DuplicateStaticPlugin { iid: String, id: String },

    /// No plugin matches the requested pair after a completed scan.
    #[error("no plugin {id:?} registered for interface {iid:?}")]
    NotFound { iid: String, id: String },

    /// Other error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PluginError::NotFound {
            iid: "org.modhost.Codec".into(),
            id: "gzip".into(),
        };
        assert_eq!(
            err.to_string(),
            "no plugin \"gzip\" registered for interface \"org.modhost.Codec\""
        );
    }

    #[test]
    fn test_duplicate_static_display() {
        let err = PluginError::DuplicateStaticPlugin {
            iid: "org.modhost.Tool".into(),
            id: "echo".into(),
        };
        assert_eq!(
            err.to_string(),
            "static plugin already registered for (org.modhost.Tool, echo)"
        );
    }
}
