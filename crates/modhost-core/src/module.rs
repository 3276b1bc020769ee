//! Module loading.
//!
//! A module is one OS-level loadable unit of code. The registry only
//! talks to modules through the [`ModuleLoader`] collaborator, so the
//! platform-specific half (libloading, in [`NativeLoader`]) can be
//! swapped out for instrumented loaders in tests.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::{Library, Symbol};
use modhost_sdk::{ENTRY_SYMBOL, MODHOST_ABI_VERSION, ModuleEntryFn};

use crate::error::{PluginError, Result};
use crate::plugin::{ForeignPlugin, Plugin};

/// Host collaborator that opens modules.
///
/// `is_candidate` decides which directory entries are worth attempting
/// to load at all; `load` turns one candidate into a [`LoadedModule`].
pub trait ModuleLoader: Send + Sync {
    /// Whether `path` looks like a loadable module for this host.
    fn is_candidate(&self, path: &Path) -> bool;

    /// Load the module at `path` and materialize its plugin set.
    ///
    /// Returning `Ok` with an entry-point issue (see
    /// [`LoadedModule::without_entry_point`]) means the file mapped
    /// fine but is not a plugin module; the registry caches it so it
    /// is never reloaded. Returning `Err` means the file could not be
    /// loaded and may be retried on a later scan.
    fn load(&self, path: &Path) -> Result<LoadedModule>;
}

/// One loaded module and the plugins its entry point produced.
///
/// Field order is part of the teardown contract: the plugin set drops
/// before the keepalive handle, so instances are destroyed while their
/// code is still mapped.
pub struct LoadedModule {
    plugins: Vec<Arc<dyn Plugin>>,
    entry_issue: Option<String>,
    path: PathBuf,
    loaded_at: chrono::DateTime<chrono::Utc>,
    _keepalive: Option<Box<dyn Any + Send + Sync>>,
}

impl LoadedModule {
    /// Create a module record from a resolved plugin set.
    pub fn new(path: impl Into<PathBuf>, plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self {
            plugins,
            entry_issue: None,
            path: path.into(),
            loaded_at: chrono::Utc::now(),
            _keepalive: None,
        }
    }

    /// Create a record for a module that lacks the entry point.
    ///
    /// The module stays in the registry's cache (avoiding reloads) but
    /// contributes no plugins.
    pub fn without_entry_point(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            plugins: Vec::new(),
            entry_issue: Some(reason.into()),
            path: path.into(),
            loaded_at: chrono::Utc::now(),
            _keepalive: None,
        }
    }

    /// Attach the OS handle (or any owner) that must outlive the plugins.
    pub fn with_keepalive(mut self, handle: impl Any + Send + Sync) -> Self {
        self._keepalive = Some(Box::new(handle));
        self
    }

    /// Normalized filesystem path of the module.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Plugins produced by the module's entry point, across all iids.
    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    /// When the module was loaded.
    pub fn loaded_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.loaded_at
    }

    /// Why the entry point resolution failed, if it did.
    pub fn entry_issue(&self) -> Option<&str> {
        self.entry_issue.as_deref()
    }
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("path", &self.path)
            .field("plugins", &self.plugins.len())
            .field("entry_issue", &self.entry_issue)
            .field("loaded_at", &self.loaded_at)
            .finish_non_exhaustive()
    }
}

/// libloading-backed module loader.
///
/// Candidates are files with the platform's loadable-module extension;
/// loaded modules must export the well-known entry point and match the
/// host's ABI version.
pub struct NativeLoader;

impl NativeLoader {
    /// Create a new native loader.
    pub fn new() -> Self {
        Self
    }

    /// Loadable-module extension for the current platform.
    pub fn platform_extension() -> &'static str {
        if cfg!(target_os = "macos") {
            "dylib"
        } else if cfg!(target_os = "windows") {
            "dll"
        } else {
            "so"
        }
    }
}

impl Default for NativeLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleLoader for NativeLoader {
    fn is_candidate(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(Self::platform_extension())
    }

    fn load(&self, path: &Path) -> Result<LoadedModule> {
        let library = unsafe { Library::new(path) }.map_err(|e| PluginError::LoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let entry: ModuleEntryFn = {
            let symbol: Symbol<ModuleEntryFn> = match unsafe { library.get(ENTRY_SYMBOL) } {
                Ok(symbol) => symbol,
                Err(e) => {
                    // Not a plugin module; keep the mapping cached anyway.
                    return Ok(LoadedModule::without_entry_point(path, e.to_string())
                        .with_keepalive(library));
                }
            };
            *symbol
        };

        let descriptor = unsafe { entry() };
        if descriptor.is_null() {
            return Err(PluginError::InvalidDescriptor {
                path: path.to_path_buf(),
                reason: "entry point returned null".to_string(),
            });
        }
        let descriptor = unsafe { &*descriptor };

        if descriptor.abi_version != MODHOST_ABI_VERSION {
            return Err(PluginError::AbiMismatch {
                path: path.to_path_buf(),
                expected: MODHOST_ABI_VERSION,
                found: descriptor.abi_version,
            });
        }

        let mut plugins: Vec<Arc<dyn Plugin>> = Vec::with_capacity(descriptor.records_len);
        for record in unsafe { descriptor.records() } {
            let plugin = unsafe { ForeignPlugin::from_record(record, path) }?;
            plugins.push(Arc::new(plugin));
        }

        tracing::info!(
            path = %path.display(),
            plugins = plugins.len(),
            "loaded plugin module"
        );

        Ok(LoadedModule::new(path, plugins).with_keepalive(library))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_candidate_filter() {
        let loader = NativeLoader::new();
        let ext = NativeLoader::platform_extension();

        assert!(loader.is_candidate(&PathBuf::from(format!("libcodec.{}", ext))));
        assert!(!loader.is_candidate(Path::new("readme.txt")));
        assert!(!loader.is_candidate(Path::new("no_extension")));
    }

    #[test]
    fn test_load_missing_file() {
        let loader = NativeLoader::new();
        let err = loader
            .load(Path::new("/nonexistent/libmissing.so"))
            .unwrap_err();
        assert!(matches!(err, PluginError::LoadFailed { .. }));
    }

    #[test]
    fn test_module_without_entry_point() {
        let module = LoadedModule::without_entry_point("/plugins/libplain.so", "symbol not found");
        assert!(module.plugins().is_empty());
        assert_eq!(module.entry_issue(), Some("symbol not found"));
        assert_eq!(module.path(), Path::new("/plugins/libplain.so"));
    }
}
