//! Plugin runtime for vebp.
//!
//! A plugin is a directory (or a zip archive of one) holding a
//! `vebp-plugin.json` manifest, an entry file and an optional
//! `dependencies/` tree of bundled packages. The [`PluginManager`] loads
//! plugins, executes their entry module once and dispatches hooks to them:
//! a hook named `init` is the module symbol `init_hook`.
//!
//! ## Module backends
//!
//! - **Script**: `.rhai` entry files run in an embedded Rhai engine
//! - **Native**: platform dynamic libraries, behind the `native-plugins`
//!   feature

pub mod archive;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod manifest;
pub mod module;
pub mod native;
pub mod script;
pub mod search_path;
pub mod types;

pub use archive::{create_archive, PluginSource};
pub use discovery::DiscoveryReport;
pub use error::PluginError;
pub use manager::PluginManager;
pub use manifest::PluginDescriptor;
pub use module::{EntryLoader, HookSlot, LoadRequest, ModuleLoader, ModuleRegistry, PluginModule};
pub use search_path::{ModuleSearchPath, SearchPathState};
pub use types::{LoadOutcome, LoadedPlugin, PluginInfo, SkipReason};
