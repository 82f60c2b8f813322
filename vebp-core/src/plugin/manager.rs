//! Plugin manager for lifecycle and hook dispatch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::settings::config::PluginsConfig;

use super::archive::PluginSource;
use super::discovery::{candidates, DiscoveryReport};
use super::error::PluginError;
use super::manifest::PluginDescriptor;
use super::module::{
    hook_symbol, module_id, EntryLoader, HookSlot, LoadRequest, ModuleLoader, ModuleRegistry,
};
use super::search_path::SearchPathState;
use super::types::{LoadOutcome, LoadedPlugin, PluginInfo, SkipReason};

/// Owns every loaded plugin together with the host-side state loading them
/// touches: bound modules and injected search paths.
///
/// Each namespace moves through `unloaded -> loaded (enabled <-> disabled)
/// -> unloaded`. All mutation goes through [`PluginManager::load`] and
/// [`PluginManager::unload`], so a namespace is in `plugins` exactly when its
/// module is bound in `modules`.
pub struct PluginManager {
    plugins: HashMap<String, LoadedPlugin>,
    /// Namespaces in load order
    order: Vec<String>,
    /// Module id -> path the plugin was loaded from
    package_paths: HashMap<String, PathBuf>,
    search_paths: SearchPathState,
    modules: ModuleRegistry,
    loader: Box<dyn ModuleLoader>,
}

impl PluginManager {
    /// Creates an empty manager that picks the module backend from the entry
    /// file extension.
    pub fn new() -> Self {
        Self::with_loader(Box::new(EntryLoader::new()))
    }

    /// Creates an empty manager using a specific module loader.
    pub fn with_loader(loader: Box<dyn ModuleLoader>) -> Self {
        Self {
            plugins: HashMap::new(),
            order: Vec::new(),
            package_paths: HashMap::new(),
            search_paths: SearchPathState::new(),
            modules: ModuleRegistry::new(),
            loader,
        }
    }

    /// Loads the plugin directory or archive at `path`.
    ///
    /// Paths that are not plugins, manifests without a namespace and
    /// namespaces that are already loaded are skipped rather than failing.
    /// If the entry module fails to execute, the search paths injected for it
    /// are reverted before the error is returned.
    pub fn load(&mut self, path: &Path) -> Result<LoadOutcome, PluginError> {
        let Some(source) = PluginSource::open(path)? else {
            debug!("Skipping {:?}: not a plugin directory or archive", path);
            return Ok(LoadOutcome::Skipped(SkipReason::NotACandidate));
        };

        let descriptor = PluginDescriptor::read(source.root())?;
        let Some(namespace) = descriptor.namespace().map(str::to_string) else {
            warn!("Plugin at {:?} has no namespace, skipping", path);
            return Ok(LoadOutcome::Skipped(SkipReason::EmptyNamespace));
        };

        if self.plugins.contains_key(&namespace) {
            warn!(plugin = %namespace, "Plugin already loaded, skipping {:?}", path);
            return Ok(LoadOutcome::Skipped(SkipReason::AlreadyLoaded(namespace)));
        }

        let module_id = module_id(&namespace);
        if self.modules.contains(&module_id) {
            warn!(plugin = %namespace, "Module {} already bound, skipping {:?}", module_id, path);
            return Ok(LoadOutcome::Skipped(SkipReason::ModuleBound(module_id)));
        }

        self.search_paths.inject(source.root(), &namespace);

        let request = LoadRequest {
            plugin_dir: source.root(),
            module_id: &module_id,
            entry: descriptor.entry(),
            module_paths: self.search_paths.shared_module_paths(),
        };
        let module = match self.modules.load_module(self.loader.as_ref(), &request) {
            Ok(module) => module,
            Err(e) => {
                self.search_paths.revert(&namespace);
                return Err(e);
            }
        };

        info!(
            plugin = %namespace,
            author = descriptor.author(),
            "Loaded plugin from {:?}",
            path
        );

        self.package_paths
            .insert(module_id.clone(), source.origin().to_path_buf());
        self.order.push(namespace.clone());
        self.plugins.insert(
            namespace.clone(),
            LoadedPlugin::new(descriptor, module, module_id, source),
        );

        Ok(LoadOutcome::Loaded(namespace))
    }

    /// Unloads a plugin, releasing its module, sub-modules and search paths.
    ///
    /// Returns false (and does nothing) if the namespace is not loaded.
    pub fn unload(&mut self, namespace: &str) -> bool {
        let Some(plugin) = self.plugins.remove(namespace) else {
            warn!(plugin = namespace, "Cannot unload: plugin is not loaded");
            return false;
        };
        self.order.retain(|loaded| loaded != namespace);

        for id in self.modules.remove_with_prefix(&plugin.module_id) {
            self.package_paths.remove(&id);
        }
        self.search_paths.revert(namespace);

        info!(plugin = namespace, "Unloaded plugin");
        true
    }

    /// Runs `hook` of one plugin.
    ///
    /// Returns `Ok(None)` when the plugin is not loaded, is disabled, or does
    /// not define the hook.
    pub fn run_hook(
        &self,
        namespace: &str,
        hook: &str,
        args: &[Value],
    ) -> Result<Option<Value>, PluginError> {
        let Some(plugin) = self.plugins.get(namespace) else {
            info!(plugin = namespace, hook, "Plugin is not loaded");
            return Ok(None);
        };

        if !plugin.is_enabled() {
            info!(plugin = namespace, hook, "Plugin is disabled");
            return Ok(None);
        }

        let symbol = hook_symbol(hook);
        match plugin.module.lookup(&symbol) {
            None => {
                info!(plugin = namespace, hook, "Plugin does not define hook");
                Ok(None)
            }
            Some(HookSlot::Value) => Err(PluginError::InvalidHook {
                namespace: namespace.to_string(),
                symbol,
            }),
            Some(HookSlot::Callable) => match plugin.module.invoke(&symbol, args) {
                Ok(value) => {
                    debug!(plugin = namespace, hook, "Hook completed");
                    Ok(Some(value))
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    error!(plugin = namespace, hook, error = %message, "Hook failed");
                    Err(PluginError::HookFailed {
                        namespace: namespace.to_string(),
                        symbol,
                        message,
                    })
                }
            },
        }
    }

    /// Runs `hook` on every loaded plugin in load order.
    ///
    /// The first failure stops the pass and is returned.
    pub fn run_hook_all(
        &self,
        hook: &str,
        args: &[Value],
    ) -> Result<Vec<Option<Value>>, PluginError> {
        self.order
            .iter()
            .map(|namespace| self.run_hook(namespace, hook, args))
            .collect()
    }

    /// Enables hook dispatch for a loaded plugin.
    pub fn enable(&mut self, namespace: &str) -> Result<(), PluginError> {
        self.set_enabled(namespace, true)
    }

    /// Disables hook dispatch for a loaded plugin.
    pub fn disable(&mut self, namespace: &str) -> Result<(), PluginError> {
        self.set_enabled(namespace, false)
    }

    fn set_enabled(&mut self, namespace: &str, enabled: bool) -> Result<(), PluginError> {
        let plugin = self
            .plugins
            .get_mut(namespace)
            .ok_or_else(|| PluginError::NotLoaded {
                namespace: namespace.to_string(),
            })?;
        plugin.set_enabled(enabled);
        debug!(plugin = namespace, enabled, "Plugin state changed");
        Ok(())
    }

    /// Gets a specific plugin by namespace.
    pub fn get(&self, namespace: &str) -> Option<&LoadedPlugin> {
        self.plugins.get(namespace)
    }

    /// Returns loaded namespaces in load order.
    pub fn list_namespaces(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Returns summary information about all plugins in load order.
    pub fn plugin_infos(&self) -> Vec<PluginInfo> {
        self.order
            .iter()
            .filter_map(|namespace| self.plugins.get(namespace))
            .map(LoadedPlugin::info)
            .collect()
    }

    /// Path a bound module was loaded from.
    pub fn package_path(&self, module_id: &str) -> Option<&Path> {
        self.package_paths.get(module_id).map(PathBuf::as_path)
    }

    pub fn search_paths(&self) -> &SearchPathState {
        &self.search_paths
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// Returns the total number of loaded plugins.
    pub fn count(&self) -> usize {
        self.plugins.len()
    }

    /// Loads every candidate directly inside `dir`.
    ///
    /// A failing candidate is logged and recorded; it does not stop the pass.
    pub fn discover(&mut self, dir: &Path) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        let found = match candidates(dir) {
            Ok(found) => found,
            Err(e) => {
                warn!("Failed to read plugins directory {:?}: {}", dir, e);
                return report;
            }
        };

        debug!("Discovering plugins from {:?}", dir);
        for path in found {
            let result = self.load(&path);
            if let Err(e) = &result {
                warn!("Failed to load plugin from {:?}: {}", path, e);
            }
            report.record(&path, result);
        }

        debug!(
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Discovery finished for {:?}",
            dir
        );
        report
    }

    /// Discovers the configured plugin directory, then loads each
    /// individually added plugin.
    ///
    /// The plugin directory is created if it does not exist yet.
    pub fn load_configured(
        &mut self,
        config: &PluginsConfig,
        project_root: &Path,
    ) -> Result<DiscoveryReport, PluginError> {
        let src_dir = config.src_dir(project_root);
        std::fs::create_dir_all(&src_dir)?;

        let mut report = self.discover(&src_dir);
        for path in config.added_paths(project_root) {
            let result = self.load(&path);
            if let Err(e) = &result {
                warn!("Failed to load plugin from {:?}: {}", path, e);
            }
            report.record(&path, result);
        }

        info!("Loaded {} plugins", self.count());
        Ok(report)
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("order", &self.order)
            .field("search_paths", &self.search_paths)
            .field("modules", &self.modules)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::archive::create_archive;
    use crate::plugin::manifest::MANIFEST_FILENAME;
    use crate::plugin::module::{tests::StaticModule, PluginModule};
    use crate::plugin::search_path::DEPENDENCIES_DIR;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_plugin(dir: &Path, name: &str, manifest: &str, entry: &str) -> PathBuf {
        let plugin_dir = dir.join(name);
        fs::create_dir_all(&plugin_dir).unwrap();
        fs::write(plugin_dir.join(MANIFEST_FILENAME), manifest).unwrap();
        fs::write(plugin_dir.join("main.rhai"), entry).unwrap();
        plugin_dir
    }

    fn hello_plugin(dir: &Path) -> PathBuf {
        create_plugin(
            dir,
            "hello",
            r#"{"namespace": "hello", "author": "alice", "homepage": "https://example.com"}"#,
            r#"
                fn init_hook() { "initialised" }
                fn greet_hook(name) { "hello " + name }
                fn fail_hook() { throw "broken"; }
                let version_hook = "1.0";
            "#,
        )
    }

    /// Counts invocations across every module it creates.
    struct CountingModule {
        id: String,
        calls: Arc<AtomicUsize>,
    }

    impl PluginModule for CountingModule {
        fn module_id(&self) -> &str {
            &self.id
        }

        fn lookup(&self, symbol: &str) -> Option<HookSlot> {
            (symbol == "init_hook").then_some(HookSlot::Callable)
        }

        fn invoke(&self, _symbol: &str, _args: &[Value]) -> anyhow::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        }

        fn symbols(&self) -> BTreeMap<String, HookSlot> {
            BTreeMap::from([("init_hook".to_string(), HookSlot::Callable)])
        }
    }

    struct CountingLoader {
        calls: Arc<AtomicUsize>,
    }

    impl ModuleLoader for CountingLoader {
        fn load(&self, request: &LoadRequest<'_>) -> Result<Arc<dyn PluginModule>, PluginError> {
            Ok(Arc::new(CountingModule {
                id: request.module_id.to_string(),
                calls: self.calls.clone(),
            }))
        }
    }

    #[test]
    fn test_load_and_get() {
        let temp = TempDir::new().unwrap();
        let path = hello_plugin(temp.path());

        let mut manager = PluginManager::new();
        let outcome = manager.load(&path).unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded("hello".into()));

        let plugin = manager.get("hello").unwrap();
        assert_eq!(plugin.descriptor, PluginDescriptor::read(&path).unwrap());
        assert_eq!(plugin.descriptor.author(), "alice");
        assert_eq!(plugin.module_id, "plugin_hello");
        assert!(plugin.is_enabled());
        assert_eq!(plugin.source_path(), path);
        assert!(manager.modules().contains("plugin_hello"));
        assert_eq!(manager.package_path("plugin_hello"), Some(path.as_path()));
    }

    #[test]
    fn test_load_twice_is_noop() {
        let temp = TempDir::new().unwrap();
        let path = hello_plugin(temp.path());

        let mut manager = PluginManager::new();
        manager.load(&path).unwrap();
        let second = manager.load(&path).unwrap();

        assert_eq!(
            second,
            LoadOutcome::Skipped(SkipReason::AlreadyLoaded("hello".into()))
        );
        assert_eq!(manager.count(), 1);
        assert_eq!(manager.list_namespaces(), vec!["hello"]);
    }

    #[test]
    fn test_load_skips_missing_namespace() {
        let temp = TempDir::new().unwrap();
        let path = create_plugin(temp.path(), "anon", r#"{"author": "bob"}"#, "");

        let mut manager = PluginManager::new();
        let outcome = manager.load(&path).unwrap();

        assert_eq!(outcome, LoadOutcome::Skipped(SkipReason::EmptyNamespace));
        assert_eq!(manager.count(), 0);
        assert!(manager.modules().is_empty());
    }

    #[test]
    fn test_load_skips_bound_module() {
        let temp = TempDir::new().unwrap();
        let path = hello_plugin(temp.path());

        let mut manager = PluginManager::new();
        manager.modules.bind(
            "plugin_hello",
            Arc::new(StaticModule {
                id: "plugin_hello".into(),
                symbols: BTreeMap::new(),
            }),
        );

        let outcome = manager.load(&path).unwrap();
        assert_eq!(
            outcome,
            LoadOutcome::Skipped(SkipReason::ModuleBound("plugin_hello".into()))
        );
        assert!(manager.get("hello").is_none());
    }

    #[test]
    fn test_load_failure_reverts_search_paths() {
        let temp = TempDir::new().unwrap();
        let path = create_plugin(
            temp.path(),
            "broken",
            r#"{"namespace": "broken", "author": "bob"}"#,
            "fn init_hook( {",
        );
        fs::create_dir_all(path.join(DEPENDENCIES_DIR).join("requests")).unwrap();

        let mut manager = PluginManager::new();
        let result = manager.load(&path);

        assert!(matches!(result, Err(PluginError::Load { .. })));
        assert!(manager.get("broken").is_none());
        assert!(manager.search_paths().module_paths().is_empty());
        assert!(manager.search_paths().injected_for("broken").is_none());
        assert!(!manager.modules().contains("plugin_broken"));
    }

    #[test]
    fn test_load_missing_entry() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("noentry");
        fs::create_dir_all(&path).unwrap();
        fs::write(
            path.join(MANIFEST_FILENAME),
            r#"{"namespace": "noentry", "author": "bob"}"#,
        )
        .unwrap();

        let mut manager = PluginManager::new();
        assert!(matches!(manager.load(&path), Err(PluginError::Load { .. })));
        assert_eq!(manager.count(), 0);
    }

    #[test]
    fn test_load_malformed_manifest() {
        let temp = TempDir::new().unwrap();
        let path = create_plugin(temp.path(), "bad", "{ nope", "");

        let mut manager = PluginManager::new();
        assert!(matches!(
            manager.load(&path),
            Err(PluginError::MalformedManifest { .. })
        ));
    }

    #[test]
    fn test_unload_releases_everything() {
        let temp = TempDir::new().unwrap();
        let path = hello_plugin(temp.path());
        fs::create_dir_all(path.join(DEPENDENCIES_DIR).join("requests")).unwrap();

        let mut manager = PluginManager::new();
        manager.load(&path).unwrap();
        assert_eq!(manager.search_paths().module_paths().len(), 1);

        manager.modules.bind(
            "plugin_hello.util",
            Arc::new(StaticModule {
                id: "plugin_hello.util".into(),
                symbols: BTreeMap::new(),
            }),
        );

        assert!(manager.unload("hello"));
        assert!(manager.get("hello").is_none());
        assert!(manager.list_namespaces().is_empty());
        assert!(manager.modules().is_empty());
        assert!(manager.search_paths().module_paths().is_empty());
        assert!(manager.search_paths().injected_for("hello").is_none());
        assert!(manager.package_path("plugin_hello").is_none());

        // Unloading again is a no-op
        assert!(!manager.unload("hello"));
    }

    #[test]
    fn test_dependency_of_unloaded_plugin_is_not_importable() {
        let temp = TempDir::new().unwrap();
        let provider = create_plugin(
            temp.path(),
            "provider",
            r#"{"namespace": "provider", "author": "alice"}"#,
            "",
        );
        let greeting = provider.join(DEPENDENCIES_DIR).join("greeting");
        fs::create_dir_all(&greeting).unwrap();
        fs::write(greeting.join("greet.rhai"), r#"fn hi() { "from provider" }"#).unwrap();

        let consumer = create_plugin(
            temp.path(),
            "consumer",
            r#"{"namespace": "consumer", "author": "bob"}"#,
            r#"fn use_hook() { import "greet" as g; g::hi() }"#,
        );

        let mut manager = PluginManager::new();
        manager.load(&provider).unwrap();
        manager.load(&consumer).unwrap();
        assert_eq!(
            manager.run_hook("consumer", "use", &[]).unwrap(),
            Some(json!("from provider"))
        );

        manager.unload("provider");
        assert!(matches!(
            manager.run_hook("consumer", "use", &[]),
            Err(PluginError::HookFailed { .. })
        ));
    }

    #[test]
    fn test_dependency_of_later_plugin_is_importable() {
        let temp = TempDir::new().unwrap();
        let consumer = create_plugin(
            temp.path(),
            "consumer",
            r#"{"namespace": "consumer", "author": "bob"}"#,
            r#"fn use_hook() { import "greet" as g; g::hi() }"#,
        );
        let provider = create_plugin(
            temp.path(),
            "provider",
            r#"{"namespace": "provider", "author": "alice"}"#,
            "",
        );
        let greeting = provider.join(DEPENDENCIES_DIR).join("greeting");
        fs::create_dir_all(&greeting).unwrap();
        fs::write(greeting.join("greet.rhai"), r#"fn hi() { "from provider" }"#).unwrap();

        let mut manager = PluginManager::new();
        manager.load(&consumer).unwrap();
        manager.load(&provider).unwrap();

        assert_eq!(
            manager.run_hook("consumer", "use", &[]).unwrap(),
            Some(json!("from provider"))
        );
    }

    #[test]
    fn test_reload_after_unload() {
        let temp = TempDir::new().unwrap();
        let path = hello_plugin(temp.path());

        let mut manager = PluginManager::new();
        manager.load(&path).unwrap();
        manager.unload("hello");

        assert!(manager.load(&path).unwrap().is_loaded());
        assert_eq!(
            manager.run_hook("hello", "init", &[]).unwrap(),
            Some(json!("initialised"))
        );
    }

    #[test]
    fn test_run_hook() {
        let temp = TempDir::new().unwrap();
        let mut manager = PluginManager::new();
        manager.load(&hello_plugin(temp.path())).unwrap();

        assert_eq!(
            manager.run_hook("hello", "greet", &[json!("bob")]).unwrap(),
            Some(json!("hello bob"))
        );
        assert_eq!(manager.run_hook("hello", "missing", &[]).unwrap(), None);
        assert_eq!(manager.run_hook("nobody", "init", &[]).unwrap(), None);
    }

    #[test]
    fn test_run_hook_value_is_invalid() {
        let temp = TempDir::new().unwrap();
        let mut manager = PluginManager::new();
        manager.load(&hello_plugin(temp.path())).unwrap();

        let err = manager.run_hook("hello", "version", &[]).unwrap_err();
        assert!(matches!(
            err,
            PluginError::InvalidHook { ref symbol, .. } if symbol == "version_hook"
        ));
    }

    #[test]
    fn test_run_hook_failure_propagates() {
        let temp = TempDir::new().unwrap();
        let mut manager = PluginManager::new();
        manager.load(&hello_plugin(temp.path())).unwrap();

        let err = manager.run_hook("hello", "fail", &[]).unwrap_err();
        assert!(matches!(err, PluginError::HookFailed { .. }));
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_disabled_plugin_skips_hooks() {
        let temp = TempDir::new().unwrap();
        let mut manager = PluginManager::new();
        manager.load(&hello_plugin(temp.path())).unwrap();

        manager.disable("hello").unwrap();
        assert!(!manager.get("hello").unwrap().is_enabled());
        assert_eq!(manager.run_hook("hello", "init", &[]).unwrap(), None);
        assert_eq!(manager.run_hook("hello", "fail", &[]).unwrap(), None);
        assert_eq!(manager.run_hook("hello", "version", &[]).unwrap(), None);

        manager.enable("hello").unwrap();
        assert_eq!(
            manager.run_hook("hello", "init", &[]).unwrap(),
            Some(json!("initialised"))
        );
    }

    #[test]
    fn test_enable_unknown_plugin() {
        let mut manager = PluginManager::new();
        assert!(matches!(
            manager.enable("ghost"),
            Err(PluginError::NotLoaded { .. })
        ));
        assert!(matches!(
            manager.disable("ghost"),
            Err(PluginError::NotLoaded { .. })
        ));
    }

    #[test]
    fn test_hook_invoked_exactly_once() {
        let temp = TempDir::new().unwrap();
        let path = hello_plugin(temp.path());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut manager = PluginManager::with_loader(Box::new(CountingLoader {
            calls: calls.clone(),
        }));
        manager.load(&path).unwrap();
        manager.run_hook("hello", "init", &[]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        manager.unload("hello");
        assert!(!manager.list_namespaces().contains(&"hello".to_string()));
    }

    #[test]
    fn test_run_hook_all_in_load_order() {
        let temp = TempDir::new().unwrap();
        let mut manager = PluginManager::new();
        for (name, value) in [("zeta", 1), ("alpha", 2)] {
            let path = create_plugin(
                temp.path(),
                name,
                &format!(r#"{{"namespace": "{name}", "author": "bob"}}"#),
                &format!("fn init_hook() {{ {value} }}"),
            );
            manager.load(&path).unwrap();
        }
        create_plugin(
            temp.path(),
            "quiet",
            r#"{"namespace": "quiet", "author": "bob"}"#,
            "fn other_hook() { 0 }",
        );
        manager.load(&temp.path().join("quiet")).unwrap();

        let results = manager.run_hook_all("init", &[]).unwrap();
        assert_eq!(results, vec![Some(json!(1)), Some(json!(2)), None]);
        assert_eq!(manager.list_namespaces(), vec!["zeta", "alpha", "quiet"]);
    }

    #[test]
    fn test_run_hook_all_stops_on_failure() {
        let temp = TempDir::new().unwrap();
        let mut manager = PluginManager::new();
        manager.load(&hello_plugin(temp.path())).unwrap();

        assert!(manager.run_hook_all("fail", &[]).is_err());
    }

    #[test]
    fn test_archive_loads_like_directory() {
        let temp = TempDir::new().unwrap();
        let path = hello_plugin(&temp.path().join("src"));
        let archive = temp.path().join("hello.zip");
        create_archive(&path, &archive).unwrap();

        let mut manager = PluginManager::new();
        manager.load(&archive).unwrap();

        let plugin = manager.get("hello").unwrap();
        let extracted = plugin.root().to_path_buf();
        assert_eq!(plugin.descriptor.namespace(), Some("hello"));
        assert_eq!(plugin.descriptor.author(), "alice");
        assert_eq!(plugin.source_path(), archive);
        assert!(extracted.is_dir());
        assert_eq!(
            manager.run_hook("hello", "greet", &[json!("zip")]).unwrap(),
            Some(json!("hello zip"))
        );

        manager.unload("hello");
        assert!(!extracted.exists());
    }

    #[test]
    fn test_discover_continues_past_failures() {
        let temp = TempDir::new().unwrap();
        hello_plugin(temp.path());
        create_plugin(
            temp.path(),
            "broken",
            r#"{"namespace": "broken", "author": "bob"}"#,
            "fn init_hook( {",
        );
        create_plugin(temp.path(), "anon", "{}", "");
        fs::write(temp.path().join("README.md"), "not a plugin").unwrap();

        let mut manager = PluginManager::new();
        let report = manager.discover(temp.path());

        assert_eq!(report.loaded, vec!["hello"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(manager.list_namespaces(), vec!["hello"]);
    }

    #[test]
    fn test_discover_missing_directory() {
        let temp = TempDir::new().unwrap();
        let mut manager = PluginManager::new();

        let report = manager.discover(&temp.path().join("missing"));
        assert!(report.loaded.is_empty());
        assert!(report.is_clean());
    }

    #[test]
    fn test_load_configured() {
        let temp = TempDir::new().unwrap();
        let extra = hello_plugin(&temp.path().join("elsewhere"));

        let config = PluginsConfig {
            src: "plugins".into(),
            add: vec![extra.to_string_lossy().into_owned()],
        };

        let mut manager = PluginManager::new();
        let report = manager.load_configured(&config, temp.path()).unwrap();

        assert!(temp.path().join("plugins").is_dir());
        assert_eq!(report.loaded, vec!["hello"]);
        assert_eq!(manager.plugin_infos()[0].hooks, vec!["fail", "greet", "init", "version"]);
    }
}
