use crate::settings::config::{ProjectConfig, CONFIG_FILENAME};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads and persists the project configuration.
///
/// The configuration lives next to the project it describes, so every
/// manager is tied to one project root.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
    config: ProjectConfig,
}

impl ConfigManager {
    /// Load the configuration of the project rooted at `project_root`
    pub fn load(project_root: &Path) -> Result<Self> {
        Self::from_path(project_root.join(CONFIG_FILENAME))
    }

    /// Load the configuration from a specific file. A missing file yields the
    /// defaults without creating it.
    pub fn from_path(path: PathBuf) -> Result<Self> {
        let config = if path.is_file() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config from {path:?}"))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config {path:?}"))?
        } else {
            debug!("No config at {:?}, using defaults", path);
            ProjectConfig::default()
        };

        Ok(Self {
            config_path: path,
            config,
        })
    }

    /// Write a default configuration into `project_root`.
    ///
    /// Returns `Ok(false)` if one already exists and `overwrite` is not set.
    pub fn create_default(project_root: &Path, overwrite: bool) -> Result<bool> {
        let path = project_root.join(CONFIG_FILENAME);
        if path.exists() && !overwrite {
            return Ok(false);
        }

        let manager = Self {
            config_path: path,
            config: ProjectConfig::default(),
        };
        manager.save()?;
        Ok(true)
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Update in-memory configuration. Note: nothing is saved to disk
    pub fn config_mut(&mut self) -> &mut ProjectConfig {
        &mut self.config
    }

    /// Persist the in-memory configuration
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {parent:?}"))?;
        }

        let contents =
            serde_json::to_string_pretty(&self.config).context("Failed to serialize config")?;
        fs::write(&self.config_path, contents)
            .with_context(|| format!("Failed to write config to {:?}", self.config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Directory containing the config file
    pub fn project_root(&self) -> &Path {
        self.config_path.parent().unwrap_or_else(|| Path::new("."))
    }
}
