//! The plugin registry state machine.
//!
//! Hosts configure per-iid search paths and static plugins, then look
//! implementations up by `(iid, id)`. The registry scans lazily: an iid
//! is marked dirty whenever its configuration changes, and the first
//! lookup that sees the mark rebuilds that iid's resolved table under
//! the write lock. Warm lookups are pure cache reads under the shared
//! lock.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::error::{PluginError, Result};
use crate::module::{LoadedModule, ModuleLoader, NativeLoader};
use crate::plugin::{Plugin, PluginInfo, PluginOrigin};

/// One recoverable failure recorded during a scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanIssue {
    /// Candidate file the failure concerns.
    pub path: PathBuf,

    /// Rendered error.
    pub error: String,

    /// When the failure was recorded.
    pub at: chrono::DateTime<chrono::Utc>,
}

/// A resolved entry in an iid's lookup table.
struct ResolvedEntry {
    plugin: Arc<dyn Plugin>,
    origin: PluginOrigin,
}

/// Registry state guarded by the readers-writer lock.
///
/// Field order is part of the teardown contract: resolved tables drop
/// first (releasing plugin references), the module cache afterwards
/// (releasing instances, then OS handles), static references last.
#[derive(Default)]
struct RegistryState {
    /// iid -> (id -> resolved plugin).
    resolved: HashMap<String, HashMap<String, ResolvedEntry>>,

    /// iid -> recoverable failures from the most recent scan.
    issues: HashMap<String, Vec<ScanIssue>>,

    /// iid -> ordered search directories.
    search_paths: HashMap<String, Vec<PathBuf>>,

    /// iids whose resolved table may be stale.
    dirty: HashSet<String>,

    /// Normalized path -> loaded module, shared across all iids.
    modules: HashMap<PathBuf, LoadedModule>,

    /// iid -> (id -> static plugin). Never touched by scans except to
    /// merge into rebuild results; never invalidated.
    statics: HashMap<String, HashMap<String, Arc<dyn Plugin>>>,
}

/// Plugin discovery and lifecycle registry.
///
/// All state lives behind a single [`RwLock`], per the registry's
/// concurrency contract: lookups on a clean iid take the shared lock;
/// configuration changes and scans take the exclusive lock, so one
/// scan in progress serializes all mutations process-wide.
///
/// Plugins returned by lookups are references into the registry's own
/// cache and must be dropped before the registry itself; module-backed
/// capabilities dangle once the registry releases their module.
pub struct PluginRegistry {
    loader: Arc<dyn ModuleLoader>,
    state: RwLock<RegistryState>,
}

impl PluginRegistry {
    /// Create a registry using the platform-native module loader.
    pub fn new() -> Self {
        Self::with_loader(Arc::new(NativeLoader::new()))
    }

    /// Create a registry with a custom module loader.
    pub fn with_loader(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            loader,
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Append a search directory for an iid.
    ///
    /// Idempotent: adding a directory already on the iid's list changes
    /// nothing. Otherwise the iid is marked dirty and the next lookup
    /// rescans.
    pub fn add_search_path(&self, iid: impl Into<String>, dir: impl Into<PathBuf>) {
        let iid = iid.into();
        let dir = dir.into();

        let mut guard = self.state.write();
        let state = &mut *guard;
        let paths = state.search_paths.entry(iid.clone()).or_default();
        if paths.contains(&dir) {
            return;
        }
        paths.push(dir);
        state.dirty.insert(iid);
    }

    /// Register a plugin compiled into the host process.
    ///
    /// Re-registering the same plugin object under its `(iid, id)` pair
    /// is a no-op; registering a different object under an occupied
    /// pair fails with [`PluginError::DuplicateStaticPlugin`].
    pub fn register_static_plugin(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let iid = plugin.iid().to_string();
        let id = plugin.id().to_string();

        let mut guard = self.state.write();
        let state = &mut *guard;
        let statics = state.statics.entry(iid.clone()).or_default();
        if let Some(existing) = statics.get(&id) {
            if Arc::ptr_eq(existing, &plugin) {
                return Ok(());
            }
            return Err(PluginError::DuplicateStaticPlugin { iid, id });
        }
        statics.insert(id, plugin);
        state.dirty.insert(iid);
        Ok(())
    }

    /// All resolved plugins for an iid, scanning first if it is dirty.
    ///
    /// Returns an empty vector (not an error) when nothing is found.
    pub fn list_plugins(&self, iid: &str) -> Vec<Arc<dyn Plugin>> {
        self.ensure_clean(iid);
        let state = self.state.read();
        state
            .resolved
            .get(iid)
            .map(|table| table.values().map(|entry| entry.plugin.clone()).collect())
            .unwrap_or_default()
    }

    /// Look up one plugin by `(iid, id)`, scanning first if needed.
    pub fn get_plugin(&self, iid: &str, id: &str) -> Result<Arc<dyn Plugin>> {
        self.ensure_clean(iid);
        let state = self.state.read();
        state
            .resolved
            .get(iid)
            .and_then(|table| table.get(id))
            .map(|entry| entry.plugin.clone())
            .ok_or_else(|| PluginError::NotFound {
                iid: iid.to_string(),
                id: id.to_string(),
            })
    }

    /// Whether a plugin is resolvable for `(iid, id)`.
    pub fn contains(&self, iid: &str, id: &str) -> bool {
        self.get_plugin(iid, id).is_ok()
    }

    /// Introspection snapshot of an iid's resolved table.
    pub fn plugin_infos(&self, iid: &str) -> Vec<PluginInfo> {
        self.ensure_clean(iid);
        let state = self.state.read();
        state
            .resolved
            .get(iid)
            .map(|table| {
                table
                    .iter()
                    .map(|(id, entry)| PluginInfo {
                        iid: iid.to_string(),
                        id: id.clone(),
                        origin: entry.origin.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Recoverable failures recorded by the most recent scan of an iid.
    pub fn scan_issues(&self, iid: &str) -> Vec<ScanIssue> {
        let state = self.state.read();
        state.issues.get(iid).cloned().unwrap_or_default()
    }

    /// The configured search directories for an iid, in order.
    pub fn search_paths(&self, iid: &str) -> Vec<PathBuf> {
        let state = self.state.read();
        state.search_paths.get(iid).cloned().unwrap_or_default()
    }

    /// Number of modules currently held in the path-keyed cache.
    pub fn module_count(&self) -> usize {
        self.state.read().modules.len()
    }

    /// Make sure `iid`'s resolved table is current.
    ///
    /// Check-release-recheck: the dirty mark is probed under the shared
    /// lock, and re-probed after acquiring the exclusive lock so racing
    /// cold lookups trigger exactly one scan.
    fn ensure_clean(&self, iid: &str) {
        {
            let state = self.state.read();
            if !state.dirty.contains(iid) {
                return;
            }
        }

        let mut state = self.state.write();
        if state.dirty.contains(iid) {
            state.scan(iid, self.loader.as_ref());
        }
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryState {
    /// Rebuild the resolved table for one iid.
    ///
    /// Runs under the exclusive lock. Only `resolved`, `issues`,
    /// `modules` and the iid's dirty mark are touched; other iids'
    /// tables stay as they are.
    fn scan(&mut self, iid: &str, loader: &dyn ModuleLoader) {
        let mut table: HashMap<String, ResolvedEntry> = HashMap::new();
        let mut issues: Vec<ScanIssue> = Vec::new();

        // Statics are merged first so they win ties against anything
        // discovered on disk.
        if let Some(statics) = self.statics.get(iid) {
            for (id, plugin) in statics {
                table.insert(
                    id.clone(),
                    ResolvedEntry {
                        plugin: plugin.clone(),
                        origin: PluginOrigin::Static,
                    },
                );
            }
        }

        let dirs = self.search_paths.get(iid).cloned().unwrap_or_default();
        for dir in &dirs {
            for candidate in list_candidates(dir, loader) {
                let normalized = match candidate.canonicalize() {
                    Ok(path) => path,
                    Err(e) => {
                        record_issue(&mut issues, &candidate, &e.to_string());
                        continue;
                    }
                };

                if let Some(module) = self.modules.get(&normalized) {
                    tracing::debug!(path = %normalized.display(), "module cache hit");
                    merge_module(iid, module, &mut table);
                    continue;
                }

                match loader.load(&normalized) {
                    Ok(module) => {
                        if let Some(reason) = module.entry_issue() {
                            tracing::warn!(
                                path = %normalized.display(),
                                reason,
                                "module has no plugin entry point"
                            );
                            record_issue(&mut issues, &normalized, reason);
                        }
                        merge_module(iid, &module, &mut table);
                        self.modules.insert(normalized, module);
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %normalized.display(),
                            error = %e,
                            "skipping unloadable candidate"
                        );
                        record_issue(&mut issues, &normalized, &e.to_string());
                    }
                }
            }
        }

        tracing::info!(iid, plugins = table.len(), issues = issues.len(), "plugin scan complete");

        self.resolved.insert(iid.to_string(), table);
        self.issues.insert(iid.to_string(), issues);
        self.dirty.remove(iid);
    }
}

/// Insert a module's plugins for `iid` under first-discovered-wins.
fn merge_module(iid: &str, module: &LoadedModule, table: &mut HashMap<String, ResolvedEntry>) {
    for plugin in module.plugins() {
        if plugin.iid() != iid {
            continue;
        }
        table.entry(plugin.id().to_string()).or_insert_with(|| ResolvedEntry {
            plugin: plugin.clone(),
            origin: PluginOrigin::Module {
                path: module.path().to_path_buf(),
            },
        });
    }
}

/// Candidate files in a directory, filtered and sorted by filename.
///
/// A missing or unreadable directory yields no candidates; that is a
/// configuration situation, not a scan failure.
fn list_candidates(dir: &Path, loader: &dyn ModuleLoader) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "skipping unreadable search directory");
            return Vec::new();
        }
    };

    let mut candidates: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && loader.is_candidate(path))
        .collect();
    candidates.sort();
    candidates
}

fn record_issue(issues: &mut Vec<ScanIssue>, path: &Path, error: &str) {
    issues.push(ScanIssue {
        path: path.to_path_buf(),
        error: error.to_string(),
        at: chrono::Utc::now(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = PluginRegistry::new();
        assert_eq!(registry.module_count(), 0);
    }

    #[test]
    fn test_unconfigured_iid_is_empty() {
        let registry = PluginRegistry::new();
        assert!(registry.list_plugins("org.modhost.Codec").is_empty());
        assert!(matches!(
            registry.get_plugin("org.modhost.Codec", "gzip"),
            Err(PluginError::NotFound { .. })
        ));
    }

    #[test]
    fn test_search_path_idempotent() {
        let registry = PluginRegistry::new();
        registry.add_search_path("org.modhost.Codec", "/opt/codecs");
        registry.add_search_path("org.modhost.Codec", "/opt/codecs");
        registry.add_search_path("org.modhost.Codec", "/usr/lib/codecs");
        assert_eq!(
            registry.search_paths("org.modhost.Codec"),
            vec![PathBuf::from("/opt/codecs"), PathBuf::from("/usr/lib/codecs")]
        );
    }
}
