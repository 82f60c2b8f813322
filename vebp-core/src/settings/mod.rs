pub mod config;
pub mod manager;


pub use config::{PackageConfig, PluginsConfig, ProjectConfig};
pub use manager::ConfigManager;
