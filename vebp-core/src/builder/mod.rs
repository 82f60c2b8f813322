//! Plugin packager.
//!
//! Turns a plugin source tree into the `<namespace>.zip` artifact the plugin
//! runtime loads, bundling the third-party packages it declares in
//! `requirements.txt` under `dependencies/`.

pub mod dependencies;
pub mod exclude;
pub mod plugin;

pub use dependencies::{DependencyMap, DependencyResolver, PythonEnvironment};
pub use exclude::ExclusionRules;
pub use plugin::PluginBuilder;
