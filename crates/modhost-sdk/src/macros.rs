//! Export macro for module authors.

/// Declare the plugins a module provides and emit the entry point.
///
/// Expands to the `modhost_module_entry` symbol the host resolves after
/// loading the module, so it may appear at most once per cdylib.
///
/// # Usage
/// ```ignore
/// modhost_sdk::declare_plugins! {
///     { iid: "org.modhost.Codec", id: "gzip", create: gzip_create, destroy: gzip_destroy },
///     { iid: "org.modhost.Codec", id: "zstd", create: zstd_create, destroy: zstd_destroy },
/// }
/// ```
#[macro_export]
macro_rules! declare_plugins {
    ($( { iid: $iid:expr, id: $id:expr, create: $create:path, destroy: $destroy:path } ),+ $(,)?) => {
        #[no_mangle]
        pub unsafe extern "C" fn modhost_module_entry() -> *const $crate::ModuleDescriptor {
            const RECORDS: &[$crate::PluginRecord] = &[
                $(
                    $crate::PluginRecord {
                        iid: concat!($iid, "\0").as_ptr() as *const ::std::os::raw::c_char,
                        id: concat!($id, "\0").as_ptr() as *const ::std::os::raw::c_char,
                        create: $create,
                        destroy: $destroy,
                    },
                )+
            ];
            static DESCRIPTOR: $crate::ModuleDescriptor = $crate::ModuleDescriptor {
                abi_version: $crate::MODHOST_ABI_VERSION,
                records: RECORDS.as_ptr(),
                records_len: RECORDS.len(),
            };
            &DESCRIPTOR
        }
    };
}
