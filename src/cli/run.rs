//! Task command implementations (run, watch, list)

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use super::{EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};
use crate::config::loader::merge_cli_overrides;
use crate::config::{default_config, find_config, load_config, CliOverrides, ConfigError, SiteConfig};
use crate::pipeline::registry::{Orchestrator, RegistryError};
use crate::pipeline::result::GroupResult;
use crate::watch::WatchController;

/// Load configuration and determine the project root (the directory
/// holding mill.toml, or the current directory when none exists).
fn load_project(
    config_path: Option<&Path>,
    overrides: &CliOverrides,
    verbose: bool,
) -> Result<(SiteConfig, PathBuf), ExitCode> {
    let located = match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => find_config(),
    };

    let (mut config, root) = match located {
        Some(path) => {
            if verbose {
                println!("Using config: {}", path.display());
            }
            let config = match load_config(Some(&path)) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Error loading config: {}", e);
                    let code = match e {
                        ConfigError::Io(_) => EXIT_ERROR,
                        ConfigError::Parse(_) | ConfigError::Validation(_) => EXIT_INVALID_ARGS,
                    };
                    return Err(ExitCode::from(code));
                }
            };
            let root = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
            (config, root)
        }
        None => {
            if verbose {
                println!("No mill.toml found, using defaults");
            }
            (default_config(), std::env::current_dir().unwrap_or_default())
        }
    };

    merge_cli_overrides(&mut config, overrides);

    // Overridden roots can reintroduce overlap; check again
    let errors = config.validate();
    if !errors.is_empty() {
        for error in errors {
            eprintln!("Error: {}", error);
        }
        return Err(ExitCode::from(EXIT_INVALID_ARGS));
    }

    Ok((config, root))
}

fn build_orchestrator(
    config: &SiteConfig,
    project_root: &Path,
) -> Result<Orchestrator, ExitCode> {
    Orchestrator::from_config(config, project_root).map_err(|e| {
        eprintln!("Error: {}", e);
        ExitCode::from(EXIT_INVALID_ARGS)
    })
}

/// Run a task or group by name.
pub fn run_task(
    config_path: Option<&Path>,
    overrides: &CliOverrides,
    verbose: bool,
    task: &str,
    dry_run: bool,
    json: bool,
) -> ExitCode {
    let (config, project_root) = match load_project(config_path, overrides, verbose) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let orch = match build_orchestrator(&config, &project_root) {
        Ok(orch) => orch,
        Err(code) => return code,
    };

    if dry_run {
        return dry_run_task(&orch, task);
    }

    match orch.run(task) {
        Ok(result) => {
            if json {
                match serde_json::to_string_pretty(&result) {
                    Ok(out) => println!("{}", out),
                    Err(e) => eprintln!("Error serializing result: {}", e),
                }
            } else {
                report(&result, verbose);
            }
            if result.is_success() {
                ExitCode::from(EXIT_SUCCESS)
            } else {
                ExitCode::from(EXIT_ERROR)
            }
        }
        Err(e @ RegistryError::UnknownTask(_)) => {
            eprintln!("Error: {}", e);
            eprintln!("Run 'mill list' to see available tasks");
            ExitCode::from(EXIT_INVALID_ARGS)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_INVALID_ARGS)
        }
    }
}

/// Resolve a task's sources and print what would run, writing nothing.
fn dry_run_task(orch: &Orchestrator, task: &str) -> ExitCode {
    let members: Vec<String> = match orch.group_members(task) {
        Some(members) => members.to_vec(),
        None if orch.stage(task).is_some() => vec![task.to_string()],
        None => {
            eprintln!("Error: Unknown task '{}'", task);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    };

    println!("Dry run - would run:");
    for member in &members {
        let Some(stage) = orch.stage(member) else { continue };
        println!("  {} ({})", member, stage.transform_name());
        match stage.resolve() {
            Ok(files) if files.is_empty() => println!("    (no files matched)"),
            Ok(files) => {
                for file in files {
                    println!(
                        "    {} -> {}",
                        file.path.display(),
                        stage.destination().join(&file.relative).display()
                    );
                }
            }
            Err(e) => {
                eprintln!("    Error: {}", e);
                return ExitCode::from(EXIT_INVALID_ARGS);
            }
        }
    }
    ExitCode::from(EXIT_SUCCESS)
}

/// Print a run's outcome: summary to stdout, per-file errors to stderr.
fn report(result: &GroupResult, verbose: bool) {
    println!("{}", result.summary());

    for stage in &result.stages {
        for error in &stage.errors {
            eprintln!("Error [{}] {}: {}", stage.stage, error.path.display(), error.message);
        }
        if verbose {
            if let Some(fatal) = &stage.fatal {
                eprintln!("Fatal [{}]: {}", stage.stage, fatal);
            }
        }
    }
}

/// Run the develop group, then watch the source root for changes.
pub fn run_watch(
    config_path: Option<&Path>,
    overrides: &CliOverrides,
    verbose: bool,
) -> ExitCode {
    let (config, project_root) = match load_project(config_path, overrides, verbose) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let orch = match build_orchestrator(&config, &project_root) {
        Ok(orch) => orch,
        Err(code) => return code,
    };

    let source_root = project_root.join(&config.project.source);
    println!("Press Ctrl+C to stop");

    let controller = WatchController::new(&orch, "develop", source_root, config.watch.clone())
        .with_verbose(verbose);

    match controller.run() {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("Watch error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// List registered tasks and groups.
pub fn run_list(config_path: Option<&Path>, overrides: &CliOverrides) -> ExitCode {
    let (config, project_root) = match load_project(config_path, overrides, false) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let orch = match build_orchestrator(&config, &project_root) {
        Ok(orch) => orch,
        Err(code) => return code,
    };

    println!("Tasks:");
    for name in orch.task_names() {
        let transform = orch.stage(name).map(|s| s.transform_name()).unwrap_or("");
        println!("  {} ({})", name, transform);
    }

    println!("Groups:");
    for (name, members) in orch.groups() {
        println!("  {} [{}]", name, members.join(", "));
    }

    ExitCode::from(EXIT_SUCCESS)
}
