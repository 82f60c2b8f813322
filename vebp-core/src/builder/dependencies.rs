//! Locating a plugin's third-party packages in its target environment.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use crate::settings::PackageConfig;

/// Dependency declaration at the plugin root.
pub const REQUIREMENTS_FILENAME: &str = "requirements.txt";

/// Requirement lines naming the host tool are never bundled.
const HOST_TOOL_NAME: &str = "vebp";

const SITE_PACKAGES_QUERY: &str = "import sysconfig; print(sysconfig.get_paths()['purelib'])";

/// Declared package name -> installed package directory.
pub type DependencyMap = BTreeMap<String, PathBuf>;

/// Extracts package names from `requirements.txt` contents.
///
/// Blank lines, comments and lines mentioning the host tool are dropped, and
/// `==` version pins are cut off.
pub fn parse_requirements(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| !line.to_lowercase().contains(HOST_TOOL_NAME))
        .filter_map(|line| {
            let name = line.split("==").next().unwrap_or_default().trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

/// Reads the declared dependencies of the plugin at `plugin_dir`.
///
/// A plugin without a requirements file has no dependencies.
pub fn read_requirements(plugin_dir: &Path) -> Result<Vec<String>> {
    let path = plugin_dir.join(REQUIREMENTS_FILENAME);
    if !path.is_file() {
        debug!("No {} in {:?}", REQUIREMENTS_FILENAME, plugin_dir);
        return Ok(Vec::new());
    }

    let contents =
        fs::read_to_string(&path).with_context(|| format!("Failed to read {path:?}"))?;
    Ok(parse_requirements(&contents))
}

/// The Python environment a plugin's dependencies are installed in.
#[derive(Debug, Clone)]
pub struct PythonEnvironment {
    venv_dir: PathBuf,
}

impl PythonEnvironment {
    pub fn new(venv_dir: impl Into<PathBuf>) -> Self {
        Self {
            venv_dir: venv_dir.into(),
        }
    }

    /// The environment named by the plugin's `vebp-package.json`.
    pub fn for_plugin(plugin_dir: &Path) -> Result<Self> {
        let config = PackageConfig::read(plugin_dir)?;
        Ok(Self::new(config.venv_dir(plugin_dir)))
    }

    /// Interpreter of the environment.
    ///
    /// `None` if the environment does not exist. Falls back to `python` on
    /// `PATH` when the environment has no interpreter of its own.
    pub fn interpreter(&self) -> Option<PathBuf> {
        if !self.venv_dir.is_dir() {
            return None;
        }

        let python = if cfg!(windows) {
            self.venv_dir.join("Scripts").join("python.exe")
        } else {
            self.venv_dir.join("bin").join("python")
        };

        if python.is_file() {
            Some(python)
        } else {
            Some(PathBuf::from("python"))
        }
    }

    /// Asks the environment's interpreter for its installed-package directory.
    pub fn site_packages(&self) -> Result<PathBuf> {
        let Some(python) = self.interpreter() else {
            bail!("Virtual environment not found: {}", self.venv_dir.display());
        };

        let output = Command::new(&python)
            .arg("-c")
            .arg(SITE_PACKAGES_QUERY)
            .output()
            .with_context(|| format!("Failed to run {}", python.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("Site-packages query failed: {}", stderr.trim());
        }

        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if path.is_empty() {
            bail!("Site-packages query returned nothing");
        }
        Ok(PathBuf::from(path))
    }
}

/// Finds installed packages inside a site-packages directory.
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    site_packages: PathBuf,
}

impl DependencyResolver {
    pub fn new(site_packages: impl Into<PathBuf>) -> Self {
        Self {
            site_packages: site_packages.into(),
        }
    }

    /// Resolves every package that can be found; the rest are logged and left
    /// out.
    pub fn resolve(&self, packages: &[String]) -> DependencyMap {
        let mut resolved = DependencyMap::new();
        for package in packages {
            match self.find_dependency_path(package) {
                Some(path) => {
                    info!(package = %package, "Resolved dependency to {:?}", path);
                    resolved.insert(package.clone(), path);
                }
                None => warn!(package = %package, "Dependency not found, skipping"),
            }
        }
        resolved
    }

    /// Locates the installed directory of `package`.
    ///
    /// Tries `<name>`, then `_<name>` with dashes as underscores, then the
    /// same two forms of the top-level name recorded in each
    /// `<name>-*.dist-info/top_level.txt`.
    pub fn find_dependency_path(&self, package: &str) -> Option<PathBuf> {
        if let Some(path) = self.find_package_dir(package) {
            return Some(path);
        }

        self.dist_infos(package).iter().find_map(|dist_info| {
            let top_level = top_level_name(dist_info)?;
            debug!(package, top_level = %top_level, "Trying top-level name");
            self.find_package_dir(&top_level)
        })
    }

    fn find_package_dir(&self, name: &str) -> Option<PathBuf> {
        let exact = self.site_packages.join(name);
        if exact.is_dir() {
            return Some(exact);
        }

        let underscored = self
            .site_packages
            .join(format!("_{}", name.replace('-', "_")));
        underscored.is_dir().then_some(underscored)
    }

    fn dist_infos(&self, package: &str) -> Vec<PathBuf> {
        let prefix = format!("{package}-");
        let Ok(entries) = fs::read_dir(&self.site_packages) else {
            return Vec::new();
        };
        let mut dist_infos: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name.starts_with(&prefix) && name.ends_with(".dist-info")
            })
            .map(|entry| entry.path())
            .collect();
        dist_infos.sort();
        dist_infos
    }
}

fn top_level_name(dist_info: &Path) -> Option<String> {
    let contents = fs::read_to_string(dist_info.join("top_level.txt")).ok()?;
    let first = contents.lines().next()?.trim();
    (!first.is_empty()).then(|| first.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("requests", vec!["requests"])]
    #[case("requests==2.31.0", vec!["requests"])]
    #[case("  PyYAML == 6.0  ", vec!["PyYAML"])]
    #[case("# comment\n\nrich", vec!["rich"])]
    #[case("vebp==0.4\nVEBP-tools\nclick", vec!["click"])]
    #[case("", vec![])]
    fn test_parse_requirements(#[case] contents: &str, #[case] expected: Vec<&str>) {
        assert_eq!(parse_requirements(contents), expected);
    }

    #[test]
    fn test_read_requirements_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(read_requirements(temp.path()).unwrap().is_empty());
    }

    fn site_packages() -> TempDir {
        let temp = TempDir::new().unwrap();
        let site = temp.path();
        fs::create_dir_all(site.join("requests")).unwrap();
        fs::create_dir_all(site.join("_cffi_backend")).unwrap();
        fs::create_dir_all(site.join("yaml")).unwrap();
        fs::create_dir_all(site.join("PyYAML-6.0.1.dist-info")).unwrap();
        fs::write(
            site.join("PyYAML-6.0.1.dist-info").join("top_level.txt"),
            "_yaml\nyaml\n",
        )
        .unwrap();
        fs::create_dir_all(site.join("_yaml")).unwrap();
        fs::create_dir_all(site.join("attrs-23.1.0.dist-info")).unwrap();
        fs::write(site.join("attrs-23.1.0.dist-info").join("top_level.txt"), "attr\n").unwrap();
        fs::create_dir_all(site.join("attr")).unwrap();
        // Older dist-info names a module that is no longer installed
        fs::create_dir_all(site.join("legacy-1.0.dist-info")).unwrap();
        fs::write(site.join("legacy-1.0.dist-info").join("top_level.txt"), "gone\n").unwrap();
        fs::create_dir_all(site.join("legacy-2.0.dist-info")).unwrap();
        fs::write(site.join("legacy-2.0.dist-info").join("top_level.txt"), "legacy_core\n").unwrap();
        fs::create_dir_all(site.join("legacy_core")).unwrap();
        temp
    }

    #[rstest]
    #[case("requests", Some("requests"))]
    #[case("cffi-backend", Some("_cffi_backend"))]
    #[case("PyYAML", Some("_yaml"))]
    #[case("attrs", Some("attr"))]
    #[case("legacy", Some("legacy_core"))]
    #[case("nonexistent-pkg", None)]
    fn test_find_dependency_path(#[case] package: &str, #[case] expected: Option<&str>) {
        let site = site_packages();
        let resolver = DependencyResolver::new(site.path());

        assert_eq!(
            resolver.find_dependency_path(package),
            expected.map(|name| site.path().join(name))
        );
    }

    #[test]
    fn test_resolve_omits_unresolved() {
        let site = site_packages();
        let resolver = DependencyResolver::new(site.path());

        let resolved = resolver.resolve(&["requests".into(), "nonexistent-pkg".into()]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved["requests"], site.path().join("requests"));
    }

    #[test]
    fn test_interpreter_selection() {
        let temp = TempDir::new().unwrap();
        let venv = temp.path().join(".venv");

        let env = PythonEnvironment::new(&venv);
        assert_eq!(env.interpreter(), None);
        assert!(env.site_packages().is_err());

        fs::create_dir_all(&venv).unwrap();
        assert_eq!(env.interpreter(), Some(PathBuf::from("python")));
    }

    #[cfg(unix)]
    #[test]
    fn test_site_packages_query() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let bin = temp.path().join(".venv").join("bin");
        fs::create_dir_all(&bin).unwrap();
        let python = bin.join("python");
        fs::write(&python, "#!/bin/sh\necho /opt/site-packages\n").unwrap();
        fs::set_permissions(&python, fs::Permissions::from_mode(0o755)).unwrap();

        let env = PythonEnvironment::for_plugin(temp.path()).unwrap();
        assert_eq!(env.interpreter(), Some(python));
        assert_eq!(
            env.site_packages().unwrap(),
            PathBuf::from("/opt/site-packages")
        );
    }
}
