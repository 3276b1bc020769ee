//! C ABI descriptor types shared between the host and loadable modules.
//!
//! Every module exports a single well-known entry point
//! ([`ENTRY_SYMBOL_NAME`]) returning a [`ModuleDescriptor`]: an ABI
//! version plus a table of [`PluginRecord`]s. One module may declare
//! plugins for any number of interface identifiers.

use std::ffi::CStr;
use std::os::raw::{c_char, c_void};

/// Current plugin ABI version.
///
/// The host rejects a module's plugins when this does not match the
/// version baked into the module's descriptor.
pub const MODHOST_ABI_VERSION: u32 = 1;

/// Name of the entry point symbol, as a string.
pub const ENTRY_SYMBOL_NAME: &str = "modhost_module_entry";

/// Name of the entry point symbol, NUL-terminated for symbol lookup.
pub const ENTRY_SYMBOL: &[u8] = b"modhost_module_entry\0";

/// Signature of the entry point every module exports.
///
/// Returns a pointer to a descriptor with static storage duration;
/// the host may read it for as long as the module stays loaded.
pub type ModuleEntryFn = unsafe extern "C" fn() -> *const ModuleDescriptor;

/// One plugin declared by a module.
#[repr(C)]
pub struct PluginRecord {
    /// Interface identifier the plugin implements. NUL-terminated UTF-8.
    pub iid: *const c_char,

    /// Plugin id, unique within the iid's namespace. NUL-terminated UTF-8.
    pub id: *const c_char,

    /// Produces a new capability instance. Must not return null.
    pub create: unsafe extern "C" fn() -> *mut c_void,

    /// Releases an instance produced by `create`.
    pub destroy: unsafe extern "C" fn(*mut c_void),
}

// The raw pointers reference static, immutable module data.
unsafe impl Sync for PluginRecord {}
unsafe impl Send for PluginRecord {}

impl PluginRecord {
    /// Read the iid as UTF-8.
    ///
    /// # Safety
    /// `self.iid` must point to a NUL-terminated string.
    pub unsafe fn iid_str(&self) -> Result<&str, std::str::Utf8Error> {
        unsafe { CStr::from_ptr(self.iid) }.to_str()
    }

    /// Read the id as UTF-8.
    ///
    /// # Safety
    /// `self.id` must point to a NUL-terminated string.
    pub unsafe fn id_str(&self) -> Result<&str, std::str::Utf8Error> {
        unsafe { CStr::from_ptr(self.id) }.to_str()
    }
}

/// Descriptor returned by a module's entry point.
#[repr(C)]
pub struct ModuleDescriptor {
    /// ABI version the module was built against.
    pub abi_version: u32,

    /// Pointer to the first plugin record.
    pub records: *const PluginRecord,

    /// Number of plugin records.
    pub records_len: usize,
}

unsafe impl Sync for ModuleDescriptor {}
unsafe impl Send for ModuleDescriptor {}

impl ModuleDescriptor {
    /// View the record table as a slice.
    ///
    /// # Safety
    /// `records` must point to `records_len` valid, initialized entries.
    pub unsafe fn records(&self) -> &[PluginRecord] {
        if self.records_len == 0 || self.records.is_null() {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.records, self.records_len) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abi_version() {
        assert_eq!(MODHOST_ABI_VERSION, 1);
    }

    #[test]
    fn test_entry_symbol_is_nul_terminated() {
        assert_eq!(ENTRY_SYMBOL.last(), Some(&0));
        assert_eq!(&ENTRY_SYMBOL[..ENTRY_SYMBOL.len() - 1], ENTRY_SYMBOL_NAME.as_bytes());
    }

    #[test]
    fn test_empty_descriptor_records() {
        let descriptor = ModuleDescriptor {
            abi_version: MODHOST_ABI_VERSION,
            records: std::ptr::null(),
            records_len: 0,
        };
        assert!(unsafe { descriptor.records() }.is_empty());
    }
}
