//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod run;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// sitemill - asset build pipeline for static sites
#[derive(Parser)]
#[command(name = "mill")]
#[command(about = "sitemill - build, publish, and watch static site assets")]
#[command(version)]
pub struct Cli {
    /// Path to mill.toml (default: walk up from the current directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the source root
    #[arg(long, global = true)]
    pub source: Option<PathBuf>,

    /// Override the development output root
    #[arg(long, global = true)]
    pub dev: Option<PathBuf>,

    /// Override the production output root
    #[arg(long, global = true)]
    pub publish: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a task or task group by name
    Run {
        /// Task name: a stage ("styles", "markup", "scripts", "fonts",
        /// "images", "publish-*") or a group ("develop", "production")
        task: String,

        /// Resolve sources and show what would be processed without writing
        #[arg(long)]
        dry_run: bool,

        /// Emit the run result as JSON instead of the human summary
        #[arg(long)]
        json: bool,
    },
    /// Run the develop group once, then rebuild on file changes
    Watch,
    /// List registered tasks and groups
    List,
}

/// CLI entry point. Returns the process exit code.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let overrides = crate::config::CliOverrides {
        source: cli.source.clone(),
        dev: cli.dev.clone(),
        publish: cli.publish.clone(),
    };

    match &cli.command {
        Commands::Run { task, dry_run, json } => {
            run::run_task(cli.config.as_deref(), &overrides, cli.verbose, task, *dry_run, *json)
        }
        Commands::Watch => run::run_watch(cli.config.as_deref(), &overrides, cli.verbose),
        Commands::List => run::run_list(cli.config.as_deref(), &overrides),
    }
}
