//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use crate::build::TaskContext;
use crate::config::loader::{find_config, load_config_with, CliOverrides};
use crate::config::Variant;
use crate::env::select_environment;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// Assetflow - compile, bundle and minify front-end assets, with a live-reload dev server
#[derive(Parser)]
#[command(name = "aflow")]
#[command(about = "Assetflow - compile Sass, bundle scripts, render templates and serve them with live reload")]
#[command(version)]
pub struct Cli {
    /// Environment to build for (defaults to NODE_ENV, then development)
    #[arg(long, global = true)]
    pub env: Option<String>,

    /// Path to assetflow.toml (default: search upward from the current directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Project variant: static or wordpress
    #[arg(long, global = true)]
    pub variant: Option<Variant>,

    /// Dev server port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Upstream site to proxy instead of serving the output root
    #[arg(long, global = true, value_name = "URL")]
    pub proxy: Option<String>,

    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build everything, start the dev server and rebuild on changes (default)
    Dev,

    /// Clean the output root and build everything once
    Build,

    /// Print the resolved environment
    Env {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    crate::logging::init(cli.verbose);

    let ctx = match load_context(&cli) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };

    match cli.command.unwrap_or(Commands::Dev) {
        Commands::Dev => build::run_dev(&ctx),
        Commands::Build => build::run_build(&ctx),
        Commands::Env { json } => build::run_env(&ctx, json),
    }
}

/// Load the configuration, select the environment and build the task
/// context shared by every command.
fn load_context(cli: &Cli) -> Result<TaskContext, ExitCode> {
    let config_path = match &cli.config {
        Some(path) if !path.exists() => {
            eprintln!("Error: config file not found: {}", path.display());
            return Err(ExitCode::from(EXIT_INVALID_ARGS));
        }
        Some(path) => Some(path.clone()),
        None => find_config(),
    };
    if cli.verbose {
        match &config_path {
            Some(path) => eprintln!("Using config: {}", path.display()),
            None => eprintln!("No assetflow.toml found, using defaults"),
        }
    }

    let overrides = CliOverrides { variant: cli.variant, port: cli.port, proxy: cli.proxy.clone() };
    let config = load_config_with(config_path.as_deref(), &overrides).map_err(|e| {
        eprintln!("Error loading config: {}", e);
        ExitCode::from(EXIT_ERROR)
    })?;

    let project_root = project_root(config_path.as_deref()).map_err(|e| {
        eprintln!("Error: cannot resolve project root: {}", e);
        ExitCode::from(EXIT_ERROR)
    })?;

    let environment = select_environment(&config, cli.env.as_deref()).map_err(|e| {
        eprintln!("Error: {}", e);
        ExitCode::from(EXIT_INVALID_ARGS)
    })?;
    info!("[build env] {} [is production] {}", environment.name(), environment.is_production());

    Ok(TaskContext::new(config, project_root, environment).with_verbose(cli.verbose))
}

/// The config file's directory, or the current directory without one.
fn project_root(config_path: Option<&Path>) -> std::io::Result<PathBuf> {
    let root = match config_path.and_then(Path::parent) {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    root.canonicalize()
}
