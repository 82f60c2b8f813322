//! Native module loading using libloading.

use std::sync::Arc;

use crate::plugin::error::PluginError;
use crate::plugin::module::{LoadRequest, ModuleLoader, PluginModule};

/// Loads platform dynamic libraries as plugin modules.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeModuleLoader;

impl ModuleLoader for NativeModuleLoader {
    /// Loads a native module from the entry library.
    ///
    /// # Safety
    ///
    /// This executes code from an external dynamic library. Only load
    /// plugins from trusted sources.
    #[cfg(feature = "native-plugins")]
    fn load(&self, request: &LoadRequest<'_>) -> Result<Arc<dyn PluginModule>, PluginError> {
        let module = imp::LoadedNativeModule::open(request)?;
        Ok(Arc::new(module))
    }

    #[cfg(not(feature = "native-plugins"))]
    fn load(&self, request: &LoadRequest<'_>) -> Result<Arc<dyn PluginModule>, PluginError> {
        Err(PluginError::load(
            request.module_id,
            "Native plugin support is not enabled. Compile with the 'native-plugins' feature.",
        ))
    }
}

#[cfg(feature = "native-plugins")]
mod imp {
    use std::collections::BTreeMap;
    use std::ffi::{c_char, CStr, CString};

    use anyhow::{anyhow, bail, Context, Result};
    use libloading::Library;
    use serde_json::Value;
    use tracing::debug;

    use super::super::abi::{
        CreateFn, DescriptorFn, DestroyFn, FreeStringFn, InvokeFn, InvokeResponse,
        ModuleDescriptor, RawModulePtr, SymbolsFn, CREATE_SYMBOL, DESCRIPTOR_SYMBOL,
        DESTROY_SYMBOL, FREE_STRING_SYMBOL, INVOKE_SYMBOL, SYMBOLS_SYMBOL,
        VEBP_MODULE_ABI_VERSION,
    };
    use crate::plugin::error::PluginError;
    use crate::plugin::module::{HookSlot, LoadRequest, PluginModule};

    /// A module instance living inside a loaded library.
    pub(super) struct LoadedNativeModule {
        module_id: String,
        raw_ptr: RawModulePtr,
        destroy_fn: DestroyFn,
        invoke_fn: InvokeFn,
        free_fn: FreeStringFn,
        symbols: BTreeMap<String, HookSlot>,
        /// Declared last so the instance is destroyed before the library unloads
        _library: Library,
    }

    impl LoadedNativeModule {
        pub(super) fn open(request: &LoadRequest<'_>) -> Result<Self, PluginError> {
            Self::open_library(request)
                .map_err(|e| PluginError::load(request.module_id, format!("{e:#}")))
        }

        fn open_library(request: &LoadRequest<'_>) -> Result<Self> {
            let library_path = request.entry_path();
            debug!(module = request.module_id, "Loading native module from {:?}", library_path);

            let library = unsafe {
                Library::new(&library_path)
                    .with_context(|| format!("Failed to load library: {}", library_path.display()))?
            };

            let (descriptor_fn, create_fn, destroy_fn, symbols_fn, invoke_fn, free_fn) = unsafe {
                (
                    *library
                        .get::<DescriptorFn>(DESCRIPTOR_SYMBOL)
                        .context("Module missing vebp_module_descriptor function")?,
                    *library
                        .get::<CreateFn>(CREATE_SYMBOL)
                        .context("Module missing vebp_module_create function")?,
                    *library
                        .get::<DestroyFn>(DESTROY_SYMBOL)
                        .context("Module missing vebp_module_destroy function")?,
                    *library
                        .get::<SymbolsFn>(SYMBOLS_SYMBOL)
                        .context("Module missing vebp_module_symbols function")?,
                    *library
                        .get::<InvokeFn>(INVOKE_SYMBOL)
                        .context("Module missing vebp_module_invoke function")?,
                    *library
                        .get::<FreeStringFn>(FREE_STRING_SYMBOL)
                        .context("Module missing vebp_module_free_string function")?,
                )
            };

            let descriptor = unsafe { descriptor_fn().as_ref() }
                .ok_or_else(|| anyhow!("Module descriptor is null"))?;
            let (name, version) = validate_descriptor(descriptor)?;

            let raw_ptr = unsafe { create_fn() };
            if raw_ptr.is_null() {
                bail!("Module create function returned null");
            }

            let mut module = Self {
                module_id: request.module_id.to_string(),
                raw_ptr,
                destroy_fn,
                invoke_fn,
                free_fn,
                symbols: BTreeMap::new(),
                _library: library,
            };

            let symbols_json = module.take_string(unsafe { symbols_fn(raw_ptr) })?;
            module.symbols =
                serde_json::from_str(&symbols_json).context("Invalid module symbol table")?;

            debug!(
                module = request.module_id,
                symbols = module.symbols.len(),
                "Loaded native module {} v{}",
                name,
                version
            );
            Ok(module)
        }

        fn take_string(&self, ptr: *mut c_char) -> Result<String> {
            if ptr.is_null() {
                bail!("Module returned a null string");
            }
            let text = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
            unsafe { (self.free_fn)(ptr) };
            Ok(text)
        }
    }

    fn validate_descriptor(descriptor: &ModuleDescriptor) -> Result<(String, String)> {
        if descriptor.abi_version != VEBP_MODULE_ABI_VERSION {
            bail!(
                "ABI version mismatch: module uses v{}, vebp uses v{}",
                descriptor.abi_version,
                VEBP_MODULE_ABI_VERSION
            );
        }
        if descriptor.name.is_null() {
            bail!("Module descriptor has null name");
        }
        if descriptor.version.is_null() {
            bail!("Module descriptor has null version");
        }

        let name = unsafe { CStr::from_ptr(descriptor.name) }
            .to_str()
            .context("Invalid module name")?;
        let version = unsafe { CStr::from_ptr(descriptor.version) }
            .to_str()
            .context("Invalid module version")?;
        Ok((name.to_string(), version.to_string()))
    }

    impl PluginModule for LoadedNativeModule {
        fn module_id(&self) -> &str {
            &self.module_id
        }

        fn lookup(&self, symbol: &str) -> Option<HookSlot> {
            self.symbols.get(symbol).copied()
        }

        fn invoke(&self, symbol: &str, args: &[Value]) -> Result<Value> {
            let symbol_c = CString::new(symbol).context("Symbol contains NUL byte")?;
            let args_c = CString::new(serde_json::to_string(args)?)
                .context("Arguments contain NUL byte")?;

            let raw = unsafe { (self.invoke_fn)(self.raw_ptr, symbol_c.as_ptr(), args_c.as_ptr()) };
            let response: InvokeResponse = serde_json::from_str(&self.take_string(raw)?)
                .context("Invalid response from native module")?;

            match response {
                InvokeResponse::Ok(value) => Ok(value),
                InvokeResponse::Error(message) => bail!(message),
            }
        }

        fn symbols(&self) -> BTreeMap<String, HookSlot> {
            self.symbols.clone()
        }
    }

    impl Drop for LoadedNativeModule {
        fn drop(&mut self) {
            if !self.raw_ptr.is_null() {
                unsafe { (self.destroy_fn)(self.raw_ptr) };
            }
        }
    }

    // The instance pointer is only handed back to the library that created it,
    // and NativeModule implementations are required to be Send + Sync.
    unsafe impl Send for LoadedNativeModule {}
    unsafe impl Sync for LoadedNativeModule {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::search_path::ModuleSearchPath;
    use tempfile::TempDir;

    #[test]
    #[cfg(not(feature = "native-plugins"))]
    fn test_load_without_feature() {
        let temp = TempDir::new().unwrap();
        let request = LoadRequest {
            plugin_dir: temp.path(),
            module_id: "plugin_native",
            entry: "libnative.so",
            module_paths: &ModuleSearchPath::default(),
        };

        let err = NativeModuleLoader.load(&request).err().unwrap();
        assert!(matches!(err, PluginError::Load { .. }));
        assert!(err.to_string().contains("not enabled"));
    }

    #[test]
    #[cfg(feature = "native-plugins")]
    fn test_load_rejects_non_library() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("libnative.so"), "not a library").unwrap();
        let request = LoadRequest {
            plugin_dir: temp.path(),
            module_id: "plugin_native",
            entry: "libnative.so",
            module_paths: &ModuleSearchPath::default(),
        };

        let err = NativeModuleLoader.load(&request).err().unwrap();
        assert!(matches!(err, PluginError::Load { .. }));
    }
}
