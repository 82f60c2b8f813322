//! Native plugin modules compiled as dynamic libraries (.so, .dylib, .dll).
//!
//! **Security Note**: Native modules have full access to the system and should
//! only be loaded from trusted sources. Loading is compiled in only with the
//! `native-plugins` feature; the ABI itself is always available so module
//! crates can depend on it.
//!
//! ## Module ABI
//!
//! ```c
//! const ModuleDescriptor* vebp_module_descriptor();
//! Module* vebp_module_create();
//! void vebp_module_destroy(Module* module);
//! char* vebp_module_symbols(Module* module);
//! char* vebp_module_invoke(Module* module, const char* symbol, const char* args_json);
//! void vebp_module_free_string(char* s);
//! ```
//!
//! Use the [`vebp_module!`](crate::vebp_module) macro to generate these.

pub mod abi;
pub mod loader;

pub use abi::{InvokeResponse, ModuleDescriptor, NativeModule, VEBP_MODULE_ABI_VERSION};
pub use loader::NativeModuleLoader;
