//! Capability interface of executed plugin modules and the host registry
//! they are bound in.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::error::PluginError;
use super::script::ScriptLoader;
use super::search_path::ModuleSearchPath;

/// Prefix of every plugin module identifier.
pub const MODULE_PREFIX: &str = "plugin_";

/// Suffix appended to a hook name to form the module symbol.
pub const HOOK_SUFFIX: &str = "_hook";

/// Returns the module identifier for a plugin namespace.
pub fn module_id(namespace: &str) -> String {
    format!("{MODULE_PREFIX}{namespace}")
}

/// Returns the module symbol implementing `hook`.
pub fn hook_symbol(hook: &str) -> String {
    format!("{hook}{HOOK_SUFFIX}")
}

/// What a module exposes under a given symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookSlot {
    /// A function that can be invoked.
    Callable,
    /// A plain value; present but not invocable.
    Value,
}

/// An executed plugin module.
pub trait PluginModule: Send + Sync {
    /// Identifier the module is bound under.
    fn module_id(&self) -> &str;

    /// Capability check for `symbol`.
    fn lookup(&self, symbol: &str) -> Option<HookSlot>;

    /// Invokes a callable symbol.
    fn invoke(&self, symbol: &str, args: &[Value]) -> anyhow::Result<Value>;

    /// All symbols the module exposes.
    fn symbols(&self) -> BTreeMap<String, HookSlot>;
}

/// Everything a [`ModuleLoader`] needs to execute an entry file.
#[derive(Debug, Clone, Copy)]
pub struct LoadRequest<'a> {
    pub plugin_dir: &'a Path,
    pub module_id: &'a str,
    pub entry: &'a str,
    /// Live module search path, highest priority first.
    pub module_paths: &'a ModuleSearchPath,
}

impl LoadRequest<'_> {
    /// Absolute path of the entry file.
    pub fn entry_path(&self) -> PathBuf {
        self.plugin_dir.join(self.entry)
    }
}

/// Executes plugin entry files.
pub trait ModuleLoader {
    fn load(&self, request: &LoadRequest<'_>) -> Result<Arc<dyn PluginModule>, PluginError>;
}

/// Picks the loader from the entry file extension.
///
/// `.rhai` entries run in the embedded script engine; platform dynamic
/// libraries go through the native loader.
#[derive(Debug, Default)]
pub struct EntryLoader {
    script: ScriptLoader,
}

impl EntryLoader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModuleLoader for EntryLoader {
    fn load(&self, request: &LoadRequest<'_>) -> Result<Arc<dyn PluginModule>, PluginError> {
        let extension = Path::new(request.entry)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();

        if extension == super::script::SCRIPT_EXTENSION {
            self.script.load(request)
        } else if extension == std::env::consts::DLL_EXTENSION {
            super::native::NativeModuleLoader.load(request)
        } else {
            Err(PluginError::load(
                request.module_id,
                format!("Unsupported entry file type: {}", request.entry),
            ))
        }
    }
}

/// Host-side table of executed modules, keyed by module identifier.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Arc<dyn PluginModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, module_id: &str) -> bool {
        self.modules.contains_key(module_id)
    }

    pub fn get(&self, module_id: &str) -> Option<Arc<dyn PluginModule>> {
        self.modules.get(module_id).cloned()
    }

    /// Binds `module` under `module_id`, replacing any previous binding.
    pub fn bind(&mut self, module_id: &str, module: Arc<dyn PluginModule>) {
        self.modules.insert(module_id.to_string(), module);
    }

    /// Executes the entry described by `request` and binds the result.
    ///
    /// If the identifier is already bound the existing module is returned and
    /// nothing is executed, so an entry runs at most once per identifier.
    pub fn load_module(
        &mut self,
        loader: &dyn ModuleLoader,
        request: &LoadRequest<'_>,
    ) -> Result<Arc<dyn PluginModule>, PluginError> {
        if let Some(existing) = self.get(request.module_id) {
            debug!("Module {} already bound", request.module_id);
            return Ok(existing);
        }

        if !request.entry_path().is_file() {
            return Err(PluginError::load(
                request.module_id,
                format!("Entry file not found: {}", request.entry_path().display()),
            ));
        }

        let module = loader.load(request)?;
        self.bind(request.module_id, module.clone());
        Ok(module)
    }

    /// Removes `module_id` and every sub-module named `module_id.*`.
    ///
    /// Returns the removed identifiers.
    pub fn remove_with_prefix(&mut self, module_id: &str) -> Vec<String> {
        let nested = format!("{module_id}.");
        let removed: Vec<String> = self
            .modules
            .keys()
            .filter(|id| *id == module_id || id.starts_with(&nested))
            .cloned()
            .collect();

        for id in &removed {
            self.modules.remove(id);
        }
        removed
    }

    pub fn ids(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}
