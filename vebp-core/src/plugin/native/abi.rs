//! C ABI shared by the host and native plugin modules.
//!
//! Values cross the boundary as NUL-terminated JSON strings. Strings returned
//! by a module are owned by the module and handed back through
//! `vebp_module_free_string`.

use std::collections::BTreeMap;
use std::ffi::{c_char, c_void, CStr, CString};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plugin::module::HookSlot;

/// Current ABI version. Modules must match this version to be loaded.
pub const VEBP_MODULE_ABI_VERSION: u32 = 1;

pub const DESCRIPTOR_SYMBOL: &[u8] = b"vebp_module_descriptor\0";
pub const CREATE_SYMBOL: &[u8] = b"vebp_module_create\0";
pub const DESTROY_SYMBOL: &[u8] = b"vebp_module_destroy\0";
pub const SYMBOLS_SYMBOL: &[u8] = b"vebp_module_symbols\0";
pub const INVOKE_SYMBOL: &[u8] = b"vebp_module_invoke\0";
pub const FREE_STRING_SYMBOL: &[u8] = b"vebp_module_free_string\0";

/// Descriptor returned by `vebp_module_descriptor`.
#[repr(C)]
pub struct ModuleDescriptor {
    /// ABI version the module was compiled against
    pub abi_version: u32,
    /// Module name (null-terminated UTF-8 string)
    pub name: *const c_char,
    /// Module version (null-terminated UTF-8 string)
    pub version: *const c_char,
}

// Descriptors only point at static string data.
unsafe impl Sync for ModuleDescriptor {}

/// Trait native plugin modules implement.
pub trait NativeModule: Send + Sync {
    /// Symbols the module exposes.
    fn symbols(&self) -> BTreeMap<String, HookSlot>;

    /// Invokes a callable symbol.
    fn invoke(&self, symbol: &str, args: &[Value]) -> anyhow::Result<Value>;
}

/// Outcome of a call across the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvokeResponse {
    Ok(Value),
    Error(String),
}

/// Raw pointer to a module instance.
pub type RawModulePtr = *mut c_void;

pub type DescriptorFn = unsafe extern "C" fn() -> *const ModuleDescriptor;
pub type CreateFn = unsafe extern "C" fn() -> RawModulePtr;
pub type DestroyFn = unsafe extern "C" fn(RawModulePtr);
/// Returns a JSON object mapping symbol names to `"callable"` or `"value"`.
pub type SymbolsFn = unsafe extern "C" fn(RawModulePtr) -> *mut c_char;
/// Takes a symbol and a JSON argument array, returns a JSON [`InvokeResponse`].
pub type InvokeFn =
    unsafe extern "C" fn(RawModulePtr, *const c_char, *const c_char) -> *mut c_char;
pub type FreeStringFn = unsafe extern "C" fn(*mut c_char);

/// Boxes a module behind a thin pointer.
#[doc(hidden)]
pub fn into_raw(module: Box<dyn NativeModule>) -> RawModulePtr {
    Box::into_raw(Box::new(module)) as RawModulePtr
}

/// Drops a module created by [`into_raw`].
///
/// # Safety
///
/// `ptr` must come from [`into_raw`] and not have been released before.
#[doc(hidden)]
pub unsafe fn release(ptr: RawModulePtr) {
    if !ptr.is_null() {
        drop(Box::from_raw(ptr as *mut Box<dyn NativeModule>));
    }
}

unsafe fn module_ref<'a>(ptr: RawModulePtr) -> Option<&'a dyn NativeModule> {
    (ptr as *const Box<dyn NativeModule>)
        .as_ref()
        .map(|boxed| &**boxed)
}

fn to_c_string(json: String) -> *mut c_char {
    CString::new(json)
        .map(CString::into_raw)
        .unwrap_or(std::ptr::null_mut())
}

fn encode_response(response: &InvokeResponse) -> *mut c_char {
    let json = serde_json::to_string(response)
        .unwrap_or_else(|e| format!(r#"{{"error":"Failed to encode response: {e}"}}"#));
    to_c_string(json)
}

/// Module side of `vebp_module_symbols`.
///
/// # Safety
///
/// `ptr` must come from [`into_raw`].
#[doc(hidden)]
pub unsafe fn symbols_json(ptr: RawModulePtr) -> *mut c_char {
    match module_ref(ptr) {
        Some(module) => serde_json::to_string(&module.symbols())
            .map(to_c_string)
            .unwrap_or(std::ptr::null_mut()),
        None => std::ptr::null_mut(),
    }
}

/// Module side of `vebp_module_invoke`.
///
/// # Safety
///
/// `ptr` must come from [`into_raw`]; `symbol` and `args` must be valid
/// NUL-terminated strings.
#[doc(hidden)]
pub unsafe fn invoke_json(
    ptr: RawModulePtr,
    symbol: *const c_char,
    args: *const c_char,
) -> *mut c_char {
    let Some(module) = module_ref(ptr) else {
        return encode_response(&InvokeResponse::Error("Module instance is null".into()));
    };
    if symbol.is_null() || args.is_null() {
        return encode_response(&InvokeResponse::Error("Null invocation argument".into()));
    }

    let symbol = CStr::from_ptr(symbol).to_string_lossy();
    let args: Vec<Value> = match serde_json::from_slice(CStr::from_ptr(args).to_bytes()) {
        Ok(args) => args,
        Err(e) => {
            return encode_response(&InvokeResponse::Error(format!("Invalid arguments: {e}")))
        }
    };

    let response = match module.invoke(&symbol, &args) {
        Ok(value) => InvokeResponse::Ok(value),
        Err(e) => InvokeResponse::Error(format!("{e:#}")),
    };
    encode_response(&response)
}

/// Module side of `vebp_module_free_string`.
///
/// # Safety
///
/// `ptr` must be null or come from [`symbols_json`] or [`invoke_json`].
#[doc(hidden)]
pub unsafe fn free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// Declares the exported entry points of a native plugin module.
///
/// # Example
///
/// ```rust,ignore
/// use vebp_core::plugin::native::*;
///
/// struct Greeter;
///
/// impl NativeModule for Greeter {
///     fn symbols(&self) -> BTreeMap<String, HookSlot> {
///         BTreeMap::from([("init_hook".to_string(), HookSlot::Callable)])
///     }
///
///     fn invoke(&self, symbol: &str, args: &[Value]) -> anyhow::Result<Value> {
///         Ok(Value::Null)
///     }
/// }
///
/// vebp_module!(Greeter, || Greeter);
/// ```
#[macro_export]
macro_rules! vebp_module {
    ($module_type:ty, $constructor:expr) => {
        const VEBP_MODULE_NAME: &str = concat!(env!("CARGO_PKG_NAME"), "\0");
        const VEBP_MODULE_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");

        static VEBP_MODULE_DESCRIPTOR: $crate::plugin::native::abi::ModuleDescriptor =
            $crate::plugin::native::abi::ModuleDescriptor {
                abi_version: $crate::plugin::native::abi::VEBP_MODULE_ABI_VERSION,
                name: VEBP_MODULE_NAME.as_ptr() as *const std::ffi::c_char,
                version: VEBP_MODULE_VERSION.as_ptr() as *const std::ffi::c_char,
            };

        #[no_mangle]
        pub unsafe extern "C" fn vebp_module_descriptor(
        ) -> *const $crate::plugin::native::abi::ModuleDescriptor {
            &VEBP_MODULE_DESCRIPTOR
        }

        #[no_mangle]
        pub unsafe extern "C" fn vebp_module_create() -> $crate::plugin::native::abi::RawModulePtr
        {
            let module: $module_type = ($constructor)();
            $crate::plugin::native::abi::into_raw(Box::new(module))
        }

        #[no_mangle]
        pub unsafe extern "C" fn vebp_module_destroy(
            ptr: $crate::plugin::native::abi::RawModulePtr,
        ) {
            $crate::plugin::native::abi::release(ptr)
        }

        #[no_mangle]
        pub unsafe extern "C" fn vebp_module_symbols(
            ptr: $crate::plugin::native::abi::RawModulePtr,
        ) -> *mut std::ffi::c_char {
            $crate::plugin::native::abi::symbols_json(ptr)
        }

        #[no_mangle]
        pub unsafe extern "C" fn vebp_module_invoke(
            ptr: $crate::plugin::native::abi::RawModulePtr,
            symbol: *const std::ffi::c_char,
            args: *const std::ffi::c_char,
        ) -> *mut std::ffi::c_char {
            $crate::plugin::native::abi::invoke_json(ptr, symbol, args)
        }

        #[no_mangle]
        pub unsafe extern "C" fn vebp_module_free_string(ptr: *mut std::ffi::c_char) {
            $crate::plugin::native::abi::free_string(ptr)
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use serde_json::json;

    struct Echo;

    impl NativeModule for Echo {
        fn symbols(&self) -> BTreeMap<String, HookSlot> {
            BTreeMap::from([
                ("echo_hook".to_string(), HookSlot::Callable),
                ("version_hook".to_string(), HookSlot::Value),
            ])
        }

        fn invoke(&self, symbol: &str, args: &[Value]) -> anyhow::Result<Value> {
            match symbol {
                "echo_hook" => Ok(json!(args)),
                _ => bail!("no such hook: {symbol}"),
            }
        }
    }

    unsafe fn take_string(ptr: *mut c_char) -> String {
        let text = CStr::from_ptr(ptr).to_string_lossy().into_owned();
        free_string(ptr);
        text
    }

    #[test]
    fn test_symbols_cross_boundary() {
        let ptr = into_raw(Box::new(Echo));
        let symbols: BTreeMap<String, HookSlot> =
            serde_json::from_str(&unsafe { take_string(symbols_json(ptr)) }).unwrap();
        unsafe { release(ptr) };

        assert_eq!(symbols.get("echo_hook"), Some(&HookSlot::Callable));
        assert_eq!(symbols.get("version_hook"), Some(&HookSlot::Value));
    }

    #[test]
    fn test_invoke_cross_boundary() {
        let ptr = into_raw(Box::new(Echo));
        let symbol = CString::new("echo_hook").unwrap();
        let args = CString::new(r#"[1, "two"]"#).unwrap();

        let raw = unsafe { invoke_json(ptr, symbol.as_ptr(), args.as_ptr()) };
        let response: InvokeResponse =
            serde_json::from_str(&unsafe { take_string(raw) }).unwrap();
        assert_eq!(response, InvokeResponse::Ok(json!([1, "two"])));

        let missing = CString::new("other_hook").unwrap();
        let raw = unsafe { invoke_json(ptr, missing.as_ptr(), args.as_ptr()) };
        let response: InvokeResponse =
            serde_json::from_str(&unsafe { take_string(raw) }).unwrap();
        assert!(matches!(response, InvokeResponse::Error(msg) if msg.contains("other_hook")));

        unsafe { release(ptr) };
    }

    #[test]
    fn test_invoke_rejects_bad_arguments() {
        let ptr = into_raw(Box::new(Echo));
        let symbol = CString::new("echo_hook").unwrap();
        let args = CString::new("{not json").unwrap();

        let raw = unsafe { invoke_json(ptr, symbol.as_ptr(), args.as_ptr()) };
        let response: InvokeResponse =
            serde_json::from_str(&unsafe { take_string(raw) }).unwrap();
        assert!(matches!(response, InvokeResponse::Error(_)));

        unsafe { release(ptr) };
    }
}
