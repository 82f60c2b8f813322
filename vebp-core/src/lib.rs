pub mod builder;
pub mod plugin;
pub mod settings;

// Public library API used by the CLI and by plugin hosts embedding vebp.
pub use builder::PluginBuilder;
pub use plugin::{LoadOutcome, PluginDescriptor, PluginError, PluginManager};
pub use settings::{ConfigManager, ProjectConfig};
