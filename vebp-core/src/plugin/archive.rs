//! Uniform directory view over loose and zipped plugins.
//!
//! The packager writes artifacts with [`create_archive`]; the runtime reads
//! them back through [`PluginSource::open`], which extracts the archive into
//! a temporary directory that lives exactly as long as the returned value.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::error::PluginError;

/// File extension of packaged plugin artifacts.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Returns true if `path` names a plugin artifact.
pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
        .unwrap_or(false)
}

/// A plugin exposed as a directory, whatever its on-disk form.
#[derive(Debug)]
pub struct PluginSource {
    origin: PathBuf,
    root: PathBuf,
    extraction: Option<TempDir>,
}

impl PluginSource {
    /// Opens a plugin candidate.
    ///
    /// Directories are used in place, zip archives are extracted to a
    /// temporary directory. Anything else is not a plugin and yields `None`.
    pub fn open(path: &Path) -> Result<Option<Self>, PluginError> {
        if path.is_dir() {
            return Ok(Some(Self {
                origin: path.to_path_buf(),
                root: path.to_path_buf(),
                extraction: None,
            }));
        }

        if path.is_file() && is_archive(path) {
            return Self::extract(path).map(Some);
        }

        Ok(None)
    }

    fn extract(path: &Path) -> Result<Self, PluginError> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file).map_err(|e| PluginError::archive(path, e))?;

        let extraction = tempfile::Builder::new().prefix("vebp-plugin-").tempdir()?;
        archive
            .extract(extraction.path())
            .map_err(|e| PluginError::archive(path, e))?;

        debug!(
            "Extracted {} entries from {:?} to {:?}",
            archive.len(),
            path,
            extraction.path()
        );

        Ok(Self {
            origin: path.to_path_buf(),
            root: extraction.path().to_path_buf(),
            extraction: Some(extraction),
        })
    }

    /// Directory holding the plugin files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path the plugin was opened from.
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    /// Returns true if the plugin came from an archive.
    pub fn is_archive(&self) -> bool {
        self.extraction.is_some()
    }
}

/// Zips the contents of `source_dir` into `archive_path`.
///
/// Entries are stored relative to `source_dir` with `/` separators.
/// Returns the number of files written.
pub fn create_archive(source_dir: &Path, archive_path: &Path) -> Result<usize, PluginError> {
    let file = File::create(archive_path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut count = 0;
    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| PluginError::archive(source_dir, e))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|e| PluginError::archive(entry.path(), e))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        zip.start_file(name, options)
            .map_err(|e| PluginError::archive(archive_path, e))?;
        let mut input = File::open(entry.path())?;
        io::copy(&mut input, &mut zip)?;
        count += 1;
    }

    zip.finish()
        .map_err(|e| PluginError::archive(archive_path, e))?;
    Ok(count)
}
