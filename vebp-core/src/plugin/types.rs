//! Core types for the plugin system.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::archive::PluginSource;
use super::manifest::PluginDescriptor;
use super::module::PluginModule;

/// A plugin whose entry module has been executed and bound.
pub struct LoadedPlugin {
    /// Descriptor read from the plugin manifest
    pub descriptor: PluginDescriptor,
    /// Executed entry module
    pub module: Arc<dyn PluginModule>,
    /// Identifier the module is bound under
    pub module_id: String,
    /// Whether hooks are dispatched to this plugin
    enabled: bool,
    /// Directory or archive the plugin was loaded from. Holds the extracted
    /// tree alive for archive sources.
    source: PluginSource,
}

impl LoadedPlugin {
    pub fn new(
        descriptor: PluginDescriptor,
        module: Arc<dyn PluginModule>,
        module_id: String,
        source: PluginSource,
    ) -> Self {
        Self {
            descriptor,
            module,
            module_id,
            enabled: true,
            source,
        }
    }

    /// Returns the plugin namespace.
    pub fn namespace(&self) -> &str {
        self.descriptor.namespace_or_default()
    }

    /// Returns true if this plugin is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Sets the enabled state of this plugin.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Path the plugin was loaded from.
    pub fn source_path(&self) -> &Path {
        self.source.origin()
    }

    /// Directory the plugin files are read from.
    pub fn root(&self) -> &Path {
        self.source.root()
    }

    /// Summary suitable for listing.
    pub fn info(&self) -> PluginInfo {
        PluginInfo {
            namespace: self.namespace().to_string(),
            author: self.descriptor.author().to_string(),
            module_id: self.module_id.clone(),
            enabled: self.enabled,
            source: self.source_path().to_path_buf(),
            archived: self.source.is_archive(),
            hooks: self
                .module
                .symbols()
                .into_keys()
                .filter_map(|symbol| {
                    symbol
                        .strip_suffix(super::module::HOOK_SUFFIX)
                        .map(str::to_string)
                })
                .collect(),
        }
    }
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("descriptor", &self.descriptor)
            .field("module_id", &self.module_id)
            .field("enabled", &self.enabled)
            .field("source", &self.source)
            .finish()
    }
}

/// Information about a loaded plugin, for display.
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub namespace: String,
    pub author: String,
    pub module_id: String,
    pub enabled: bool,
    pub source: PathBuf,
    pub archived: bool,
    /// Hook names (symbols with the hook suffix stripped)
    pub hooks: Vec<String>,
}

/// Why [`PluginManager::load`](super::PluginManager::load) declined a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Neither a directory nor a plugin archive.
    NotACandidate,
    /// The manifest has no usable namespace.
    EmptyNamespace,
    /// A plugin with this namespace is already loaded.
    AlreadyLoaded(String),
    /// The module identifier is already bound in the host registry.
    ModuleBound(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotACandidate => write!(f, "not a plugin directory or archive"),
            SkipReason::EmptyNamespace => write!(f, "manifest has no namespace"),
            SkipReason::AlreadyLoaded(ns) => write!(f, "plugin '{ns}' is already loaded"),
            SkipReason::ModuleBound(id) => write!(f, "module '{id}' is already bound"),
        }
    }
}

/// Result of a successful call to `load`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The plugin was loaded under this namespace.
    Loaded(String),
    Skipped(SkipReason),
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded(_))
    }
}
