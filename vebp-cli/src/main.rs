use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

mod commands;

use crate::commands::PluginCommand;

#[derive(Parser, Debug)]
#[command(name = "vebp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "vebp - project tooling with plugin support")]
struct Args {
    /// Project root containing vebp-config.json (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage, build and run plugins
    Plugin {
        #[command(subcommand)]
        command: PluginCommand,
    },
}

fn main() -> Result<()> {
    setup_tracing()?;

    let args = Args::parse();
    let project_root = match args.project {
        Some(root) => root
            .canonicalize()
            .with_context(|| format!("Failed to canonicalize project root {root:?}"))?,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    info!("CLI startup: project={:?}, command={:?}", project_root, args.command);

    match args.command {
        Command::Plugin { command } => commands::run_plugin_command(command, &project_root),
    }
}

fn setup_tracing() -> Result<()> {
    use std::fs;
    use tracing_subscriber::fmt;

    // Create trace directory in user's home
    let home = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
    let trace_dir = home.join(".vebp").join("trace");
    fs::create_dir_all(&trace_dir)?;

    let log_file = trace_dir.join("vebp.log");
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)?;

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Full trace goes to the log file, warnings also to stderr
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(file_filter),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time()
                .with_filter(LevelFilter::WARN),
        )
        .init();

    info!("Tracing initialized to {:?}", log_file);
    Ok(())
}
