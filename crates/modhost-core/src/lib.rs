//! ModHost core — plugin discovery and lifecycle registry.
//!
//! Given an interface identifier (iid) a host wants to instantiate, the
//! [`PluginRegistry`] produces the set of available implementations,
//! whether registered statically by the host process or discovered by
//! scanning directories for loadable modules. Each module is loaded at
//! most once per normalized path, and each resolved implementation is
//! reachable by a stable `(iid, id)` pair.
//!
//! ## Components
//!
//! - [`module`] — ownership wrapper around one loadable module and the
//!   [`ModuleLoader`] collaborator that opens it (libloading-backed by
//!   default, replaceable for tests and exotic hosts).
//! - [`plugin`] — the `{iid, id, opaque capability}` plugin model:
//!   static host-side plugins and foreign instances produced by a
//!   module's entry point.
//! - [`registry`] — the registry state machine: per-iid search paths,
//!   dirty tracking, lazy scans, and a path-keyed module cache, all
//!   behind a single readers-writer lock.

pub mod error;
pub mod module;
pub mod plugin;
pub mod registry;

pub use error::{PluginError, Result};
pub use module::{LoadedModule, ModuleLoader, NativeLoader};
pub use plugin::{Capability, ForeignPlugin, Plugin, PluginInfo, PluginOrigin, StaticPlugin};
pub use registry::{PluginRegistry, ScanIssue};
