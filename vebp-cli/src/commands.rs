use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;
use vebp_core::plugin::DiscoveryReport;
use vebp_core::{ConfigManager, PluginBuilder, PluginDescriptor, PluginManager, ProjectConfig};

/// Hook run after loading when `autoRun` is set.
const INIT_HOOK: &str = "init";

#[derive(Subcommand, Debug)]
pub enum PluginCommand {
    /// List the plugins configured for this project
    List,

    /// Package a plugin directory into <namespace>.zip
    Build {
        /// Plugin source directory
        path: PathBuf,

        /// Output directory (defaults to ./vebp-build)
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// Unload and load every configured plugin, reporting failures
    Reload,

    /// Run a hook on one plugin, or on all plugins in load order
    Hook {
        /// Hook name (the plugin defines `<name>_hook`)
        name: String,

        /// Only run the hook of this plugin
        #[arg(long, value_name = "NS")]
        namespace: Option<String>,

        /// Hook argument as JSON; anything that is not JSON is passed as a string
        #[arg(long = "arg", value_name = "JSON")]
        args: Vec<String>,
    },

    /// Scaffold a new plugin
    New {
        /// Directory to create the plugin in
        dir: PathBuf,

        /// Overwrite an existing manifest
        #[arg(long)]
        force: bool,
    },
}

pub fn run_plugin_command(command: PluginCommand, project_root: &Path) -> Result<()> {
    match command {
        PluginCommand::List => {
            let manager = load_plugins(project_root)?.0;
            let infos = manager.plugin_infos();
            if infos.is_empty() {
                println!("No plugins loaded");
            }
            for info in infos {
                let status = if info.enabled { "enabled" } else { "disabled" };
                println!(
                    "{} by {} ({}) - hooks: [{}] - {}",
                    info.namespace,
                    info.author,
                    status,
                    info.hooks.join(", "),
                    info.source.display()
                );
            }
            Ok(())
        }
        PluginCommand::Build { path, out } => {
            let mut builder = PluginBuilder::new(&path)
                .with_context(|| format!("Cannot build plugin at {}", path.display()))?;
            if let Some(out) = out {
                builder = builder.with_output_dir(out);
            }
            let artifact = builder.build()?;
            println!("Built {}", artifact.display());
            Ok(())
        }
        PluginCommand::Reload => {
            let (mut manager, _) = load_plugins(project_root)?;
            for namespace in manager.list_namespaces() {
                manager.unload(&namespace);
            }
            let config = ConfigManager::load(project_root)?;
            let report = manager.load_configured(&config.config().plugins, project_root)?;
            print_report(&report);
            if !report.is_clean() {
                bail!("{} plugin(s) failed to load", report.failed.len());
            }
            run_init_hooks(&manager, config.config())
        }
        PluginCommand::Hook {
            name,
            namespace,
            args,
        } => {
            let manager = load_plugins(project_root)?.0;
            let args: Vec<Value> = args.iter().map(|raw| parse_hook_arg(raw)).collect();

            match namespace {
                Some(namespace) => {
                    let result = manager.run_hook(&namespace, &name, &args)?;
                    print_hook_result(&namespace, result.as_ref());
                }
                None => {
                    let results = manager.run_hook_all(&name, &args)?;
                    for (namespace, result) in manager.list_namespaces().iter().zip(results) {
                        print_hook_result(namespace, result.as_ref());
                    }
                }
            }
            Ok(())
        }
        PluginCommand::New { dir, force } => {
            if PluginDescriptor::create(&dir, force)? {
                println!("Created plugin in {}", dir.display());
            } else {
                println!(
                    "{} already has a plugin manifest (use --force to overwrite)",
                    dir.display()
                );
            }
            Ok(())
        }
    }
}

/// Loads the project's configured plugins.
fn load_plugins(project_root: &Path) -> Result<(PluginManager, DiscoveryReport)> {
    let config = ConfigManager::load(project_root)?;
    let mut manager = PluginManager::new();
    let report = manager
        .load_configured(&config.config().plugins, project_root)
        .context("Failed to load configured plugins")?;

    info!(
        loaded = report.loaded.len(),
        failed = report.failed.len(),
        "Plugins loaded"
    );
    run_init_hooks(&manager, config.config())?;
    Ok((manager, report))
}

fn run_init_hooks(manager: &PluginManager, config: &ProjectConfig) -> Result<()> {
    if !config.auto_run {
        return Ok(());
    }
    manager
        .run_hook_all(INIT_HOOK, &[])
        .context("Plugin init hook failed")?;
    Ok(())
}

fn parse_hook_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn print_hook_result(namespace: &str, result: Option<&Value>) {
    match result {
        Some(value) => println!("{namespace}: {value}"),
        None => println!("{namespace}: (no result)"),
    }
}

fn print_report(report: &DiscoveryReport) {
    for namespace in &report.loaded {
        println!("loaded   {namespace}");
    }
    for (path, reason) in &report.skipped {
        println!("skipped  {} ({reason})", path.display());
    }
    for (path, error) in &report.failed {
        println!("failed   {} ({error})", path.display());
    }
}
