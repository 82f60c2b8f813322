//! Plugin discovery from filesystem.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::archive::is_archive;
use super::error::PluginError;
use super::types::{LoadOutcome, SkipReason};

/// Returns the plugin candidates directly inside `dir`, sorted by path.
///
/// Subdirectories and zip archives are candidates; any other file is not.
pub fn candidates(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() || (path.is_file() && is_archive(path)))
        .collect();
    found.sort();
    Ok(found)
}

/// What happened to each candidate during a discovery pass.
#[derive(Debug, Default, Serialize)]
pub struct DiscoveryReport {
    /// Namespaces loaded, in load order
    pub loaded: Vec<String>,
    /// Candidates declined without error
    pub skipped: Vec<(PathBuf, String)>,
    /// Candidates that failed, with the error message
    pub failed: Vec<(PathBuf, String)>,
}

impl DiscoveryReport {
    pub(crate) fn record(&mut self, path: &Path, result: Result<LoadOutcome, PluginError>) {
        match result {
            Ok(LoadOutcome::Loaded(namespace)) => self.loaded.push(namespace),
            Ok(LoadOutcome::Skipped(reason)) => self.skip(path, &reason),
            Err(e) => self.failed.push((path.to_path_buf(), e.to_string())),
        }
    }

    fn skip(&mut self, path: &Path, reason: &SkipReason) {
        self.skipped.push((path.to_path_buf(), reason.to_string()));
    }

    /// Returns true if no candidate failed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}
