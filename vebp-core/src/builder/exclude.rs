//! Which files stay out of a packaged plugin.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

const EXCLUDED_EXTENSIONS: &[&str] = &["pyc", "pyo", "pyd", "log", "tmp", "bak"];

const EXCLUDED_DIRS: &[&str] = &[
    "__pycache__",
    ".git",
    ".svn",
    ".hg",
    ".idea",
    ".vscode",
    "node_modules",
    ".venv",
    "venv",
    "dist",
    "build",
    "vebp-build",
];

const JUNK_FILES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// Exclusion rules for the files of one plugin tree.
#[derive(Debug, Clone)]
pub struct ExclusionRules {
    root: PathBuf,
    output_dir: Option<PathBuf>,
}

impl ExclusionRules {
    /// Rules for the tree rooted at `root`. Paths are matched relative to it.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output_dir: None,
        }
    }

    /// Also exclude everything under `output_dir`.
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(output_dir.into());
        self
    }

    /// Returns true if `path` must not be packaged.
    pub fn is_excluded(&self, path: &Path) -> bool {
        if let Some(output_dir) = &self.output_dir {
            if path.starts_with(output_dir) {
                return true;
            }
        }

        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let hidden_or_excluded = relative.components().any(|component| match component {
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                name.starts_with('.') || EXCLUDED_DIRS.iter().any(|dir| *dir == name)
            }
            _ => false,
        });
        if hidden_or_excluded {
            return true;
        }

        let file_name = relative
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or_default();
        JUNK_FILES.contains(&file_name) || has_extension(relative, EXCLUDED_EXTENSIONS)
    }
}

/// Returns true for build leftovers inside a bundled dependency.
pub fn is_dependency_noise(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or_default();

    name == "__pycache__" || name.ends_with(".egg-info") || has_extension(path, &["pyc", "pyo"])
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
