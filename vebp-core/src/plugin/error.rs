use std::path::PathBuf;

/// Errors raised by the plugin runtime and the plugin packager.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// A plugin source tree is missing required files or manifest fields.
    #[error("Invalid plugin at {path}: {reason}")]
    Validation { path: PathBuf, reason: String },

    /// The manifest file exists but is not valid JSON.
    #[error("Malformed plugin manifest at {path}: {reason}")]
    MalformedManifest { path: PathBuf, reason: String },

    /// The entry file is missing or failed while executing.
    #[error("Failed to load plugin module '{module_id}': {reason}")]
    Load { module_id: String, reason: String },

    /// The hook symbol exists on the module but cannot be called.
    #[error("Plugin '{namespace}' defines '{symbol}' but it is not callable")]
    InvalidHook { namespace: String, symbol: String },

    /// The hook was called and failed.
    #[error("Hook '{symbol}' of plugin '{namespace}' failed: {message}")]
    HookFailed {
        namespace: String,
        symbol: String,
        message: String,
    },

    #[error("Plugin '{namespace}' is not loaded")]
    NotLoaded { namespace: String },

    #[error("Archive error for {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PluginError {
    pub(crate) fn validation(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn load(module_id: &str, reason: impl Into<String>) -> Self {
        Self::Load {
            module_id: module_id.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn archive(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Archive {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}
