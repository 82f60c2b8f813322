//! Script plugins executed by an embedded Rhai engine.
//!
//! The entry script runs once when the module is loaded. Afterwards its
//! top-level functions are callable symbols and its top-level variables are
//! plain values (a variable holding a function pointer is callable too).
//! `import` statements resolve against the live module search path first,
//! then the plugin directory. The search path is read on every import, so a
//! dependency bundled by another plugin is only found while that plugin is
//! loaded.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail};
use rhai::module_resolvers::{FileModuleResolver, ModuleResolversCollection};
use rhai::serde::{from_dynamic, to_dynamic};
use rhai::{
    CallFnOptions, Dynamic, Engine, EvalAltResult, FnPtr, ModuleResolver, Position, Scope,
    Module, Shared, AST,
};
use serde_json::Value;
use tracing::{debug, info};

use super::error::PluginError;
use super::module::{HookSlot, LoadRequest, ModuleLoader, PluginModule};
use super::search_path::ModuleSearchPath;

/// File extension of script entry files.
pub const SCRIPT_EXTENSION: &str = "rhai";

/// Loads `.rhai` entry files.
#[derive(Debug, Default)]
pub struct ScriptLoader;

impl ModuleLoader for ScriptLoader {
    fn load(&self, request: &LoadRequest<'_>) -> Result<Arc<dyn PluginModule>, PluginError> {
        let module = ScriptModule::load(request)?;
        Ok(Arc::new(module))
    }
}

/// A compiled and executed plugin script.
pub struct ScriptModule {
    module_id: String,
    engine: Engine,
    ast: AST,
    scope: Mutex<Scope<'static>>,
    symbols: BTreeMap<String, HookSlot>,
}

impl ScriptModule {
    fn load(request: &LoadRequest<'_>) -> Result<Self, PluginError> {
        let engine = build_engine(request);
        let entry_path = request.entry_path();

        let ast = engine
            .compile_file(entry_path.clone())
            .map_err(|e| PluginError::load(request.module_id, e.to_string()))?;

        let mut scope = Scope::new();
        engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|e| PluginError::load(request.module_id, e.to_string()))?;

        let symbols = collect_symbols(&ast, &scope);
        debug!(
            module = request.module_id,
            symbols = symbols.len(),
            "Executed entry script {:?}",
            entry_path
        );

        Ok(Self {
            module_id: request.module_id.to_string(),
            engine,
            ast,
            scope: Mutex::new(scope),
            symbols,
        })
    }

    fn call(&self, symbol: &str, args: Vec<Dynamic>) -> anyhow::Result<Dynamic> {
        let mut scope = self
            .scope
            .lock()
            .map_err(|_| anyhow!("Scope of {} is poisoned", self.module_id))?;

        if self.ast.iter_functions().any(|f| f.name == symbol) {
            let options = CallFnOptions::new().eval_ast(false);
            return self
                .engine
                .call_fn_with_options::<Dynamic>(options, &mut scope, &self.ast, symbol, args)
                .map_err(|e| anyhow!("{e}"));
        }

        match scope.get_value::<FnPtr>(symbol) {
            Some(fn_ptr) => fn_ptr
                .call::<Dynamic>(&self.engine, &self.ast, args)
                .map_err(|e| anyhow!("{e}")),
            None => bail!("'{symbol}' is not callable"),
        }
    }
}

impl PluginModule for ScriptModule {
    fn module_id(&self) -> &str {
        &self.module_id
    }

    fn lookup(&self, symbol: &str) -> Option<HookSlot> {
        self.symbols.get(symbol).copied()
    }

    fn invoke(&self, symbol: &str, args: &[Value]) -> anyhow::Result<Value> {
        let args = args
            .iter()
            .map(to_dynamic)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow!("Invalid hook argument: {e}"))?;

        let result = self.call(symbol, args)?;
        from_dynamic::<Value>(&result).map_err(|e| anyhow!("Unsupported hook result: {e}"))
    }

    fn symbols(&self) -> BTreeMap<String, HookSlot> {
        self.symbols.clone()
    }
}

/// Resolves imports against the module search path as it is at import time.
struct SearchPathResolver {
    paths: ModuleSearchPath,
}

impl ModuleResolver for SearchPathResolver {
    fn resolve(
        &self,
        engine: &Engine,
        source: Option<&str>,
        path: &str,
        pos: Position,
    ) -> Result<Shared<Module>, Box<EvalAltResult>> {
        for dir in self.paths.snapshot() {
            match FileModuleResolver::new_with_path(dir).resolve(engine, source, path, pos) {
                Err(err) if matches!(*err, EvalAltResult::ErrorModuleNotFound(..)) => continue,
                result => return result,
            }
        }
        Err(EvalAltResult::ErrorModuleNotFound(path.to_string(), pos).into())
    }
}

fn build_engine(request: &LoadRequest<'_>) -> Engine {
    let mut engine = Engine::new();

    let mut resolvers = ModuleResolversCollection::new();
    resolvers.push(SearchPathResolver {
        paths: request.module_paths.clone(),
    });
    resolvers.push(FileModuleResolver::new_with_path(request.plugin_dir));
    engine.set_module_resolver(resolvers);

    let module_id = request.module_id.to_string();
    engine.on_print(move |text| info!(module = %module_id, "{}", text));

    let module_id = request.module_id.to_string();
    engine.on_debug(move |text, source, pos| {
        debug!(module = %module_id, source = ?source, position = %pos, "{}", text)
    });

    engine
}

fn collect_symbols(ast: &AST, scope: &Scope<'_>) -> BTreeMap<String, HookSlot> {
    let mut symbols: BTreeMap<String, HookSlot> = ast
        .iter_functions()
        .map(|f| (f.name.to_string(), HookSlot::Callable))
        .collect();

    for (name, _, value) in scope.iter() {
        let slot = if value.is::<FnPtr>() {
            HookSlot::Callable
        } else {
            HookSlot::Value
        };
        symbols.entry(name.to_string()).or_insert(slot);
    }

    symbols
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::search_path::SearchPathState;
    use serde_json::json;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn load_with(
        dir: &Path,
        source: &str,
        module_paths: &ModuleSearchPath,
    ) -> Result<ScriptModule, PluginError> {
        fs::write(dir.join("main.rhai"), source).unwrap();
        ScriptModule::load(&LoadRequest {
            plugin_dir: dir,
            module_id: "plugin_test",
            entry: "main.rhai",
            module_paths,
        })
    }

    fn load_script(
        dir: &Path,
        source: &str,
        module_paths: &[PathBuf],
    ) -> Result<ScriptModule, PluginError> {
        load_with(dir, source, &ModuleSearchPath::from(module_paths.to_vec()))
    }

    #[test]
    fn test_symbols() {
        let temp = TempDir::new().unwrap();
        let module = load_script(
            temp.path(),
            r#"
                fn init_hook() { 42 }
                fn real() { 7 }
                let version_hook = "1.0";
                let alias_hook = Fn("real");
            "#,
            &[],
        )
        .unwrap();

        assert_eq!(module.lookup("init_hook"), Some(HookSlot::Callable));
        assert_eq!(module.lookup("alias_hook"), Some(HookSlot::Callable));
        assert_eq!(module.lookup("version_hook"), Some(HookSlot::Value));
        assert_eq!(module.lookup("missing_hook"), None);
        assert_eq!(module.module_id(), "plugin_test");
    }

    #[test]
    fn test_invoke_with_arguments() {
        let temp = TempDir::new().unwrap();
        let module = load_script(
            temp.path(),
            r#"
                fn add_hook(a, b) { a + b }
                fn info_hook(name) { #{ name: name, tags: [1, 2] } }
                fn real() { 7 }
                let alias_hook = Fn("real");
            "#,
            &[],
        )
        .unwrap();

        assert_eq!(module.invoke("add_hook", &[json!(1), json!(2)]).unwrap(), json!(3));
        assert_eq!(
            module.invoke("info_hook", &[json!("hello")]).unwrap(),
            json!({ "name": "hello", "tags": [1, 2] })
        );
        assert_eq!(module.invoke("alias_hook", &[]).unwrap(), json!(7));
    }

    #[test]
    fn test_invoke_value_symbol_fails() {
        let temp = TempDir::new().unwrap();
        let module = load_script(temp.path(), "let version_hook = 3;", &[]).unwrap();

        assert!(module.invoke("version_hook", &[]).is_err());
    }

    #[test]
    fn test_hook_error_propagates() {
        let temp = TempDir::new().unwrap();
        let module = load_script(temp.path(), r#"fn fail_hook() { throw "nope"; }"#, &[]).unwrap();

        let err = module.invoke("fail_hook", &[]).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_syntax_error_is_load_error() {
        let temp = TempDir::new().unwrap();
        let result = load_script(temp.path(), "fn broken( {", &[]);

        assert!(matches!(result, Err(PluginError::Load { .. })));
    }

    #[test]
    fn test_top_level_failure_is_load_error() {
        let temp = TempDir::new().unwrap();
        let result = load_script(temp.path(), r#"throw "refusing to start";"#, &[]);

        let err = result.err().unwrap();
        assert!(matches!(err, PluginError::Load { .. }));
        assert!(err.to_string().contains("refusing to start"));
    }

    #[test]
    fn test_imports_resolve_from_module_paths() {
        let temp = TempDir::new().unwrap();
        let dependency = temp.path().join("dependencies").join("greeting");
        fs::create_dir_all(&dependency).unwrap();
        fs::write(dependency.join("greet.rhai"), r#"fn hi(name) { "hi " + name }"#).unwrap();

        let module = load_script(
            temp.path(),
            r#"fn greet_hook(name) { import "greet" as g; g::hi(name) }"#,
            &[dependency],
        )
        .unwrap();

        assert_eq!(module.invoke("greet_hook", &[json!("bob")]).unwrap(), json!("hi bob"));
    }

    #[test]
    fn test_imports_resolve_from_plugin_dir() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("util.rhai"), "fn double(x) { x * 2 }").unwrap();

        let module = load_script(
            temp.path(),
            r#"fn double_hook(x) { import "util" as u; u::double(x) }"#,
            &[],
        )
        .unwrap();

        assert_eq!(module.invoke("double_hook", &[json!(21)]).unwrap(), json!(42));
    }

    #[test]
    fn test_imports_follow_live_search_path() {
        let temp = TempDir::new().unwrap();
        let provider = temp.path().join("provider");
        let greeting = provider.join("dependencies").join("greeting");
        fs::create_dir_all(&greeting).unwrap();
        fs::write(greeting.join("greet.rhai"), r#"fn hi() { "hi" }"#).unwrap();

        let consumer = temp.path().join("consumer");
        fs::create_dir_all(&consumer).unwrap();

        let mut state = SearchPathState::new();
        let module = load_with(
            &consumer,
            r#"fn greet_hook() { import "greet" as g; g::hi() }"#,
            state.shared_module_paths(),
        )
        .unwrap();
        assert!(module.invoke("greet_hook", &[]).is_err());

        state.inject(&provider, "provider");
        assert_eq!(module.invoke("greet_hook", &[]).unwrap(), json!("hi"));

        state.revert("provider");
        let err = module.invoke("greet_hook", &[]).unwrap_err();
        assert!(err.to_string().contains("greet"));
    }
}
