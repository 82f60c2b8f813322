use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Project configuration file at the project root.
pub const CONFIG_FILENAME: &str = "vebp-config.json";

/// Per-plugin packaging configuration file at the plugin root.
pub const PACKAGE_FILENAME: &str = "vebp-package.json";

/// Project configuration (`vebp-config.json`).
///
/// Keys this crate does not know about are kept in `extra` and written back
/// on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Run every plugin's `init` hook once the configured plugins are loaded
    #[serde(default = "default_auto_run")]
    pub auto_run: bool,

    #[serde(default)]
    pub plugins: PluginsConfig,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_auto_run() -> bool {
    true
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            auto_run: default_auto_run(),
            plugins: PluginsConfig::default(),
            extra: Map::new(),
        }
    }
}

/// Where plugins are loaded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Directory scanned for plugins, relative to the project root
    #[serde(default = "default_plugins_src")]
    pub src: String,

    /// Individual plugin directories or archives loaded after discovery.
    /// `~` is expanded; relative paths are resolved against the project root.
    #[serde(default)]
    pub add: Vec<String>,
}

fn default_plugins_src() -> String {
    "plugins".to_string()
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            src: default_plugins_src(),
            add: Vec::new(),
        }
    }
}

impl PluginsConfig {
    /// Absolute path of the discovery directory.
    pub fn src_dir(&self, project_root: &Path) -> PathBuf {
        resolve_path(project_root, &self.src)
    }

    /// Absolute paths of the individually added plugins.
    pub fn added_paths(&self, project_root: &Path) -> Vec<PathBuf> {
        self.add
            .iter()
            .filter(|entry| !entry.trim().is_empty())
            .map(|entry| resolve_path(project_root, entry))
            .collect()
    }
}

/// Expands `~` and anchors relative paths at `base`.
pub fn resolve_path(base: &Path, raw: &str) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(raw).as_ref());
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

/// Packaging configuration of a single plugin (`vebp-package.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Virtual environment the plugin's dependencies are installed in,
    /// relative to the plugin directory
    #[serde(default = "default_venv")]
    pub venv: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_venv() -> String {
    ".venv".to_string()
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            venv: default_venv(),
            extra: Map::new(),
        }
    }
}

impl PackageConfig {
    /// Reads the package configuration of the plugin at `plugin_dir`.
    ///
    /// A missing file yields the defaults.
    pub fn read(plugin_dir: &Path) -> Result<Self> {
        let path = plugin_dir.join(PACKAGE_FILENAME);
        if !path.is_file() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read package config from {path:?}"))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse package config {path:?}"))
    }

    /// Absolute path of the virtual environment.
    pub fn venv_dir(&self, plugin_dir: &Path) -> PathBuf {
        resolve_path(plugin_dir, &self.venv)
    }
}
