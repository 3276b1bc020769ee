//! ModHost module SDK.
//!
//! This crate defines the C ABI shared between a ModHost host process and
//! the loadable modules it discovers: the descriptor types a module
//! exports, the ABI version handshake, and the `declare_plugins!` macro
//! that emits the well-known entry point.
//!
//! # Quick start
//!
//! ```no_run
//! use std::os::raw::c_void;
//!
//! struct GzipCodec;
//!
//! unsafe extern "C" fn gzip_create() -> *mut c_void {
//!     Box::into_raw(Box::new(GzipCodec)) as *mut c_void
//! }
//!
//! unsafe extern "C" fn gzip_destroy(handle: *mut c_void) {
//!     drop(Box::from_raw(handle as *mut GzipCodec));
//! }
//!
//! modhost_sdk::declare_plugins! {
//!     { iid: "org.modhost.Codec", id: "gzip", create: gzip_create, destroy: gzip_destroy },
//! }
//! ```

pub mod descriptor;
#[macro_use]
pub mod macros;

pub use descriptor::{
    ENTRY_SYMBOL, ENTRY_SYMBOL_NAME, MODHOST_ABI_VERSION, ModuleDescriptor, ModuleEntryFn,
    PluginRecord,
};
