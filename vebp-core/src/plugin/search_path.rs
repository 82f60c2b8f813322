//! Per-plugin module and native-library search paths.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::debug;

/// Subdirectory of a plugin holding its bundled third-party packages.
pub const DEPENDENCIES_DIR: &str = "dependencies";

/// Subdirectory of a bundled package holding its native libraries.
pub const NATIVE_LIBS_DIR: &str = ".libs";

/// Environment variable the platform searches for native libraries.
#[cfg(windows)]
const NATIVE_SEARCH_VAR: &str = "PATH";

/// Entries added on behalf of one plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectedPaths {
    pub module_paths: Vec<PathBuf>,
    pub native_paths: Vec<PathBuf>,
}

impl InjectedPaths {
    pub fn is_empty(&self) -> bool {
        self.module_paths.is_empty() && self.native_paths.is_empty()
    }
}

/// Live module search path shared with every loaded module.
///
/// Clones see the same list, so an import always resolves against the
/// plugins that are loaded at the time of the import.
#[derive(Debug, Clone, Default)]
pub struct ModuleSearchPath(Arc<RwLock<Vec<PathBuf>>>);

impl ModuleSearchPath {
    /// Current entries, highest priority first.
    pub fn snapshot(&self) -> Vec<PathBuf> {
        match self.0.read() {
            Ok(paths) => paths.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut Vec<PathBuf>)) {
        match self.0.write() {
            Ok(mut paths) => apply(&mut *paths),
            Err(poisoned) => apply(&mut *poisoned.into_inner()),
        }
    }
}

impl From<Vec<PathBuf>> for ModuleSearchPath {
    fn from(paths: Vec<PathBuf>) -> Self {
        Self(Arc::new(RwLock::new(paths)))
    }
}

/// Process-wide search paths, with a ledger of what each plugin added.
///
/// Entries are kept highest-priority first. Only [`SearchPathState::inject`]
/// and [`SearchPathState::revert`] mutate the lists, so unloading a plugin
/// removes exactly what loading it added.
#[derive(Debug, Default)]
pub struct SearchPathState {
    module_paths: ModuleSearchPath,
    native_paths: Vec<PathBuf>,
    injected: HashMap<String, InjectedPaths>,
}

impl SearchPathState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepends the bundled dependencies of `plugin_dir` for `namespace`.
    ///
    /// Every immediate subdirectory of `dependencies/` goes to the front of
    /// the module search path, and its `.libs` directory (when present) to
    /// the front of the native library search path. Returns the module paths
    /// that were added.
    pub fn inject(&mut self, plugin_dir: &Path, namespace: &str) -> Vec<PathBuf> {
        let dependencies_dir = plugin_dir.join(DEPENDENCIES_DIR);
        let mut packages: Vec<PathBuf> = match std::fs::read_dir(&dependencies_dir) {
            Ok(entries) => entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.is_dir())
                .collect(),
            Err(_) => return Vec::new(),
        };
        packages.sort();

        let record = self.injected.entry(namespace.to_string()).or_default();
        for package in packages {
            let native = package.join(NATIVE_LIBS_DIR);
            if native.is_dir() {
                debug!(plugin = namespace, path = ?native, "Adding native library path");
                self.native_paths.insert(0, native.clone());
                export_native_path(&native);
                record.native_paths.push(native);
            }

            debug!(plugin = namespace, path = ?package, "Adding module search path");
            self.module_paths.update(|paths| paths.insert(0, package.clone()));
            record.module_paths.push(package);
        }

        record.module_paths.clone()
    }

    /// Removes every entry previously injected for `namespace`.
    ///
    /// Returns what was removed; a namespace with no record is a no-op.
    pub fn revert(&mut self, namespace: &str) -> InjectedPaths {
        let Some(record) = self.injected.remove(namespace) else {
            return InjectedPaths::default();
        };

        self.module_paths.update(|paths| {
            for path in &record.module_paths {
                remove_first(paths, path);
            }
        });
        for path in &record.native_paths {
            remove_first(&mut self.native_paths, path);
            unexport_native_path(path);
        }

        debug!(
            plugin = namespace,
            modules = record.module_paths.len(),
            native = record.native_paths.len(),
            "Reverted search paths"
        );
        record
    }

    /// Module search path, highest priority first.
    pub fn module_paths(&self) -> Vec<PathBuf> {
        self.module_paths.snapshot()
    }

    /// Handle to the live module search path.
    pub fn shared_module_paths(&self) -> &ModuleSearchPath {
        &self.module_paths
    }

    /// Native library search path, highest priority first.
    pub fn native_paths(&self) -> &[PathBuf] {
        &self.native_paths
    }

    /// Entries currently recorded for `namespace`.
    pub fn injected_for(&self, namespace: &str) -> Option<&InjectedPaths> {
        self.injected.get(namespace)
    }
}

fn remove_first(paths: &mut Vec<PathBuf>, path: &Path) {
    if let Some(index) = paths.iter().position(|p| p == path) {
        paths.remove(index);
    }
}

#[cfg(windows)]
fn export_native_path(path: &Path) {
    let current = std::env::var_os(NATIVE_SEARCH_VAR).unwrap_or_default();
    let mut entries = vec![path.to_path_buf()];
    entries.extend(std::env::split_paths(&current));
    if let Ok(joined) = std::env::join_paths(entries) {
        std::env::set_var(NATIVE_SEARCH_VAR, joined);
    }
}

#[cfg(windows)]
fn unexport_native_path(path: &Path) {
    let Some(current) = std::env::var_os(NATIVE_SEARCH_VAR) else {
        return;
    };
    let mut entries: Vec<PathBuf> = std::env::split_paths(&current).collect();
    remove_first(&mut entries, path);
    if let Ok(joined) = std::env::join_paths(entries) {
        std::env::set_var(NATIVE_SEARCH_VAR, joined);
    }
}

#[cfg(not(windows))]
fn export_native_path(_path: &Path) {}

#[cfg(not(windows))]
fn unexport_native_path(_path: &Path) {}
