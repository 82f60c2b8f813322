//! Plugin manifest (`vebp-plugin.json`) parsing and scaffolding.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::error::PluginError;

/// Name of the manifest file at the root of every plugin.
pub const MANIFEST_FILENAME: &str = "vebp-plugin.json";

/// Namespace written into freshly scaffolded manifests.
pub const DEFAULT_NAMESPACE: &str = "vebp_plugin";

/// Author reported when the manifest does not name one.
pub const DEFAULT_AUTHOR: &str = "unknown";

/// Entry file used when the manifest does not name one.
pub const DEFAULT_ENTRY: &str = "main.rhai";

const SCAFFOLD_AUTHOR: &str = "vebp";

const SCAFFOLD_ENTRY: &str = r#"// Hooks are top-level functions named `<hook>_hook`.

fn init_hook() {
    print("plugin initialised");
}
"#;

/// Plugin descriptor read from `vebp-plugin.json`.
///
/// Every field is optional on disk. Keys other than `namespace`, `author`
/// and `entry` are kept verbatim in [`PluginDescriptor::extra`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    entry: Option<String>,

    /// Additional metadata passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PluginDescriptor {
    /// Creates a descriptor with the given namespace and author.
    pub fn new(namespace: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            author: Some(author.into()),
            entry: None,
            extra: Map::new(),
        }
    }

    /// Returns the path to the manifest file given a plugin root directory.
    pub fn manifest_path(plugin_root: &Path) -> PathBuf {
        plugin_root.join(MANIFEST_FILENAME)
    }

    /// Reads the manifest of the plugin rooted at `plugin_root`.
    ///
    /// A missing manifest yields an empty descriptor; a manifest that is not
    /// a JSON object fails with [`PluginError::MalformedManifest`].
    pub fn read(plugin_root: &Path) -> Result<Self, PluginError> {
        let path = Self::manifest_path(plugin_root);
        if !path.is_file() {
            debug!("No manifest at {:?}", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| PluginError::MalformedManifest {
            path,
            reason: e.to_string(),
        })
    }

    /// Returns the namespace, or `None` if it is missing or blank.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace
            .as_deref()
            .filter(|namespace| !namespace.trim().is_empty())
    }

    /// Returns the namespace, falling back to [`DEFAULT_NAMESPACE`].
    pub fn namespace_or_default(&self) -> &str {
        self.namespace().unwrap_or(DEFAULT_NAMESPACE)
    }

    /// Returns the author, falling back to [`DEFAULT_AUTHOR`].
    pub fn author(&self) -> &str {
        self.author.as_deref().unwrap_or(DEFAULT_AUTHOR)
    }

    /// Returns the entry file name, falling back to [`DEFAULT_ENTRY`].
    pub fn entry(&self) -> &str {
        self.entry
            .as_deref()
            .filter(|entry| !entry.trim().is_empty())
            .unwrap_or(DEFAULT_ENTRY)
    }

    /// Returns a metadata value by key, including the well-known fields.
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            "namespace" => self.namespace.clone().map(Value::String),
            "author" => self.author.clone().map(Value::String),
            "entry" => self.entry.clone().map(Value::String),
            _ => self.extra.get(key).cloned(),
        }
    }

    /// Checks the fields a distributable plugin must declare.
    pub fn require_fields(&self, plugin_root: &Path) -> Result<(), PluginError> {
        if self.namespace().is_none() {
            return Err(PluginError::validation(
                Self::manifest_path(plugin_root),
                "manifest is missing field: namespace",
            ));
        }
        if self.author.is_none() {
            return Err(PluginError::validation(
                Self::manifest_path(plugin_root),
                "manifest is missing field: author",
            ));
        }
        Ok(())
    }

    /// Writes a starter manifest and entry script into `dir`.
    ///
    /// Returns `Ok(false)` without touching anything when a manifest already
    /// exists and `overwrite` is not set. An existing entry file is kept.
    pub fn create(dir: &Path, overwrite: bool) -> Result<bool, PluginError> {
        let manifest_path = Self::manifest_path(dir);
        if manifest_path.exists() && !overwrite {
            debug!("{:?} already exists, not overwriting", manifest_path);
            return Ok(false);
        }

        std::fs::create_dir_all(dir)?;

        let descriptor = Self::new(DEFAULT_NAMESPACE, SCAFFOLD_AUTHOR);
        let content = serde_json::to_string_pretty(&descriptor)
            .map_err(|e| PluginError::validation(&manifest_path, e.to_string()))?;
        std::fs::write(&manifest_path, content)?;

        let entry_path = dir.join(descriptor.entry());
        if !entry_path.exists() {
            std::fs::write(&entry_path, SCAFFOLD_ENTRY)?;
        }

        Ok(true)
    }
}
