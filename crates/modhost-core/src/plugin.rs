//! Plugin model.
//!
//! The registry treats a plugin purely as `{iid, id, opaque capability}`.
//! Two concrete kinds exist: [`StaticPlugin`]s constructed by host code
//! and registered directly, and [`ForeignPlugin`]s materialized from a
//! loaded module's descriptor records.

use std::any::Any;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use modhost_sdk::PluginRecord;
use serde::Serialize;

use crate::error::{PluginError, Result};

/// One implementation of an interface.
///
/// `iid()` and `id()` are immutable for the object's lifetime; `id()`
/// is unique within its iid's namespace once resolved by the registry.
pub trait Plugin: Send + Sync {
    /// Interface identifier this plugin implements.
    fn iid(&self) -> &str;

    /// Plugin id, unique within the iid's namespace.
    fn id(&self) -> &str;

    /// The capability behind this plugin, opaque to the registry.
    fn capability(&self) -> Capability<'_>;
}

/// Opaque capability view over a plugin.
///
/// Hosts cast it back to the concrete interface their iid names; the
/// registry itself never interprets it.
#[derive(Clone, Copy)]
pub enum Capability<'a> {
    /// A host-process object (static plugins, test doubles).
    Object(&'a (dyn Any + Send + Sync)),

    /// A raw instance produced by a module's `create` function.
    ///
    /// Valid only while the owning module stays loaded; dereferencing
    /// it after the registry has been dropped is undefined behavior.
    Raw(NonNull<c_void>),
}

impl<'a> Capability<'a> {
    /// Downcast a host-object capability to a concrete type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&'a T> {
        match self {
            Capability::Object(obj) => obj.downcast_ref::<T>(),
            Capability::Raw(_) => None,
        }
    }

    /// The raw instance pointer, if this capability is module-backed.
    pub fn raw(&self) -> Option<NonNull<c_void>> {
        match self {
            Capability::Object(_) => None,
            Capability::Raw(ptr) => Some(*ptr),
        }
    }
}

/// A plugin compiled into the host process, never backed by a module.
pub struct StaticPlugin {
    iid: String,
    id: String,
    capability: Box<dyn Any + Send + Sync>,
}

impl StaticPlugin {
    /// Create a static plugin wrapping a host capability object.
    pub fn new(
        iid: impl Into<String>,
        id: impl Into<String>,
        capability: impl Any + Send + Sync,
    ) -> Self {
        Self {
            iid: iid.into(),
            id: id.into(),
            capability: Box::new(capability),
        }
    }
}

impl Plugin for StaticPlugin {
    fn iid(&self) -> &str {
        &self.iid
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn capability(&self) -> Capability<'_> {
        Capability::Object(self.capability.as_ref())
    }
}

/// A plugin instance produced by a loaded module's entry point.
///
/// Owns one instance created through the module's descriptor record and
/// releases it through the paired `destroy` function on drop. The
/// owning [`LoadedModule`](crate::module::LoadedModule) keeps the OS
/// library mapped for at least as long as this wrapper lives.
pub struct ForeignPlugin {
    iid: String,
    id: String,
    handle: NonNull<c_void>,
    destroy: unsafe extern "C" fn(*mut c_void),
}

// The ABI contract requires module instances to be usable from any
// thread; the wrapper itself only hands out the pointer.
unsafe impl Send for ForeignPlugin {}
unsafe impl Sync for ForeignPlugin {}

impl ForeignPlugin {
    /// Materialize a plugin from one descriptor record.
    ///
    /// # Safety
    /// `record` must come from a module that stays loaded for the
    /// lifetime of the returned plugin, with valid string pointers and
    /// callable `create`/`destroy` functions.
    pub unsafe fn from_record(record: &PluginRecord, module_path: &Path) -> Result<Self> {
        let iid = unsafe { record.iid_str() }
            .map_err(|e| PluginError::InvalidDescriptor {
                path: module_path.to_path_buf(),
                reason: format!("iid is not valid UTF-8: {}", e),
            })?
            .to_string();
        let id = unsafe { record.id_str() }
            .map_err(|e| PluginError::InvalidDescriptor {
                path: module_path.to_path_buf(),
                reason: format!("id is not valid UTF-8: {}", e),
            })?
            .to_string();

        let raw = unsafe { (record.create)() };
        let handle = NonNull::new(raw).ok_or_else(|| PluginError::InvalidDescriptor {
            path: module_path.to_path_buf(),
            reason: format!("create returned null for ({}, {})", iid, id),
        })?;

        Ok(Self {
            iid,
            id,
            handle,
            destroy: record.destroy,
        })
    }
}

impl Plugin for ForeignPlugin {
    fn iid(&self) -> &str {
        &self.iid
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn capability(&self) -> Capability<'_> {
        Capability::Raw(self.handle)
    }
}

impl Drop for ForeignPlugin {
    fn drop(&mut self) {
        unsafe { (self.destroy)(self.handle.as_ptr()) };
    }
}

/// Where a resolved plugin came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PluginOrigin {
    /// Registered directly by the host process.
    Static,

    /// Discovered in a loaded module.
    Module {
        /// Normalized path of the owning module.
        path: PathBuf,
    },
}

/// Snapshot of one resolved plugin, for host introspection.
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    /// Interface identifier.
    pub iid: String,

    /// Plugin id.
    pub id: String,

    /// Origin of the implementation.
    pub origin: PluginOrigin,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_plugin_accessors() {
        let plugin = StaticPlugin::new("org.modhost.Codec", "identity", 42u32);
        assert_eq!(plugin.iid(), "org.modhost.Codec");
        assert_eq!(plugin.id(), "identity");
    }

    #[test]
    fn test_capability_downcast() {
        let plugin = StaticPlugin::new("org.modhost.Codec", "identity", 42u32);
        let capability = plugin.capability();
        assert_eq!(capability.downcast_ref::<u32>(), Some(&42));
        assert!(capability.downcast_ref::<String>().is_none());
        assert!(capability.raw().is_none());
    }

    #[test]
    fn test_origin_serialization() {
        let origin = PluginOrigin::Module {
            path: PathBuf::from("/plugins/libcodec.so"),
        };
        let json = serde_json::to_value(&origin).unwrap();
        assert_eq!(json["kind"], "module");
        assert_eq!(json["path"], "/plugins/libcodec.so");
    }
}
