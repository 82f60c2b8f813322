//! Packaging a plugin source tree into a distributable archive.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::plugin::archive::{create_archive, ARCHIVE_EXTENSION};
use crate::plugin::error::PluginError;
use crate::plugin::manifest::{PluginDescriptor, MANIFEST_FILENAME};
use crate::plugin::search_path::DEPENDENCIES_DIR;

use super::dependencies::{read_requirements, DependencyMap, DependencyResolver, PythonEnvironment};
use super::exclude::{is_dependency_noise, ExclusionRules};

/// Where artifacts go unless configured otherwise, relative to the working
/// directory.
pub const DEFAULT_OUTPUT_DIR: &str = "vebp-build";

/// Builds `<namespace>.zip` from a plugin directory.
#[derive(Debug, Clone)]
pub struct PluginBuilder {
    plugin_dir: PathBuf,
    descriptor: PluginDescriptor,
    output_dir: PathBuf,
    site_packages: Option<PathBuf>,
}

impl PluginBuilder {
    /// Prepares a build of the plugin at `plugin_dir`.
    ///
    /// Fails if the directory or its manifest is missing, or the manifest is
    /// malformed.
    pub fn new(plugin_dir: &Path) -> Result<Self, PluginError> {
        if !plugin_dir.is_dir() {
            return Err(PluginError::validation(
                plugin_dir,
                "plugin directory does not exist",
            ));
        }
        let plugin_dir = plugin_dir.canonicalize()?;

        if !PluginDescriptor::manifest_path(&plugin_dir).is_file() {
            return Err(PluginError::validation(
                &plugin_dir,
                format!("missing file: {MANIFEST_FILENAME}"),
            ));
        }
        let descriptor = PluginDescriptor::read(&plugin_dir)?;

        Ok(Self {
            plugin_dir,
            descriptor,
            output_dir: std::env::current_dir()?.join(DEFAULT_OUTPUT_DIR),
            site_packages: None,
        })
    }

    /// Sets the directory the artifact is written to.
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    /// Resolves dependencies against `site_packages` instead of querying the
    /// plugin's environment.
    pub fn with_site_packages(mut self, site_packages: impl Into<PathBuf>) -> Self {
        self.site_packages = Some(site_packages.into());
        self
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Checks that the plugin has its manifest fields and entry file.
    pub fn validate(&self) -> Result<(), PluginError> {
        self.descriptor.require_fields(&self.plugin_dir)?;

        let entry = self.descriptor.entry();
        if !self.plugin_dir.join(entry).is_file() {
            return Err(PluginError::validation(
                &self.plugin_dir,
                format!("missing file: {entry}"),
            ));
        }
        Ok(())
    }

    /// Packages the plugin and returns the artifact path.
    ///
    /// Files are staged in a temporary directory inside the output directory,
    /// which is removed on every exit path.
    pub fn build(&self) -> Result<PathBuf, PluginError> {
        self.validate()?;
        let namespace = self.descriptor.namespace_or_default();

        fs::create_dir_all(&self.output_dir)?;
        let output_dir = self.output_dir.canonicalize()?;
        let staging = tempfile::Builder::new()
            .prefix(&format!("_{namespace}_"))
            .tempdir_in(&output_dir)?;

        info!(plugin = namespace, "Building plugin from {:?}", self.plugin_dir);

        let dependencies = self.resolve_dependencies();
        for (package, source) in &dependencies {
            let dest = staging.path().join(DEPENDENCIES_DIR).join(package);
            let copied = copy_tree(source, &dest, is_dependency_noise)?;
            debug!(package = %package, files = copied, "Bundled dependency");
        }

        let rules = ExclusionRules::new(&self.plugin_dir).with_output_dir(&output_dir);
        let copied = copy_tree(&self.plugin_dir, staging.path(), |path| {
            rules.is_excluded(path)
        })?;
        debug!(plugin = namespace, files = copied, "Staged plugin files");

        let artifact = output_dir.join(format!("{namespace}.{ARCHIVE_EXTENSION}"));
        let archived = create_archive(staging.path(), &artifact)?;

        info!(
            plugin = namespace,
            files = archived,
            dependencies = dependencies.len(),
            "Built {:?}",
            artifact
        );
        Ok(artifact)
    }

    /// Locates the packages listed in the plugin's requirements file.
    ///
    /// Failing to read the requirements or to query the environment leaves
    /// the plugin without bundled dependencies.
    pub fn resolve_dependencies(&self) -> DependencyMap {
        let packages = match read_requirements(&self.plugin_dir) {
            Ok(packages) => packages,
            Err(e) => {
                warn!("Skipping dependencies: {:#}", e);
                return DependencyMap::new();
            }
        };
        if packages.is_empty() {
            return DependencyMap::new();
        }
        debug!("Declared dependencies: {}", packages.join(", "));

        let site_packages = match &self.site_packages {
            Some(path) => path.clone(),
            None => match PythonEnvironment::for_plugin(&self.plugin_dir)
                .and_then(|env| env.site_packages())
            {
                Ok(path) => path,
                Err(e) => {
                    warn!("Could not locate site-packages, skipping dependencies: {:#}", e);
                    return DependencyMap::new();
                }
            },
        };

        DependencyResolver::new(site_packages).resolve(&packages)
    }
}

/// Copies the files under `source` to `dest`, pruning every path `skip`
/// matches. Returns the number of files copied.
fn copy_tree(
    source: &Path,
    dest: &Path,
    skip: impl Fn(&Path) -> bool,
) -> Result<usize, PluginError> {
    let mut count = 0;
    let walker = WalkDir::new(source)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !skip(entry.path()));

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| PluginError::validation(entry.path(), e.to_string()))?;
        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(entry.path(), &target)?;
        count += 1;
    }

    Ok(count)
}
