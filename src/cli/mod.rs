//! TW-030: CLI subcommands: synth, graph, validate, init, completions.

use crate::core::app::{App, Artifacts};
use crate::core::config::{self, AppConfig};
use crate::core::types::Environment;
use crate::core::{digest, wiring};
use crate::resources::backend::{self, DEFAULT_STACK};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config file picked up from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "twinform.yaml";

#[derive(Parser, Debug)]
#[command(
    name = "twinform",
    version,
    about = "Dual-target infrastructure synthesis: one construct tree, a cloud template and a local compose manifest"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by commands that build the construct tree.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Target environment (`prod*` selects production; overrides ENV)
    #[arg(short, long)]
    pub env: Option<String>,

    /// Path to twinform.yaml (default: ./twinform.yaml if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Stack id
    #[arg(long, default_value = DEFAULT_STACK)]
    pub stack: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter twinform.yaml
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate twinform.yaml
    Validate {
        /// Path to twinform.yaml
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        file: PathBuf,
    },

    /// Build the backend and write the local manifest and cloud templates
    Synth {
        #[command(flatten)]
        build: BuildArgs,

        /// Manifest output path (overrides config)
        #[arg(short, long)]
        manifest: Option<PathBuf>,

        /// Cloud template directory (overrides config)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print local services in start order with their dependencies
    Graph {
        #[command(flatten)]
        build: BuildArgs,
    },

    /// Print shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Synth {
            build,
            manifest,
            out,
        } => {
            let mut config = load_config(&build)?;
            if let Some(m) = manifest {
                config.manifest_path = config.resolve(&m);
            }
            if let Some(o) = out {
                config.cloud_out_dir = config.resolve(&o);
            }
            cmd_synth(config, &build.stack)
        }
        Commands::Graph { build } => cmd_graph(load_config(&build)?, &build.stack),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "twinform", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Defaults, then environment, then config file, then flags.
fn load_config(args: &BuildArgs) -> Result<AppConfig, String> {
    let mut config = AppConfig::from_env().map_err(|e| e.to_string())?;
    let path = args
        .config
        .clone()
        .unwrap_or_else(|| config.root_dir.join(DEFAULT_CONFIG_FILE));
    if args.config.is_some() || path.exists() {
        let file = parse_and_validate(&path)?;
        config.apply_file(&file);
        debug!(path = %path.display(), "applied config file");
    }
    if let Some(ref env) = args.env {
        config.environment = Environment::from_flag(env);
    }
    Ok(config)
}

/// Parse and validate a config file, returning errors if invalid.
fn parse_and_validate(file: &Path) -> Result<config::ConfigFile, String> {
    let parsed = config::parse_config_file(file).map_err(|e| e.to_string())?;
    let errors = config::validate_config(&parsed);
    if errors.is_empty() {
        return Ok(parsed);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err("validation failed".to_string())
}

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join(DEFAULT_CONFIG_FILE);
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()));
    }
    std::fs::create_dir_all(path).map_err(|e| format!("cannot create {}: {}", path.display(), e))?;
    std::fs::write(&config_path, config::CONFIG_TEMPLATE)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;

    println!("Initialized twinform project at {}", path.display());
    println!("  Created: {}", config_path.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let parsed = parse_and_validate(file)?;
    println!(
        "OK: {} (version {})",
        parsed.project.as_deref().unwrap_or(config::DEFAULT_PROJECT),
        parsed.version
    );
    Ok(())
}

/// Declare the backend and synthesize both artifacts.
fn synth(config: AppConfig, stack: &str) -> Result<Artifacts, String> {
    let mut app = App::new(config);
    backend::declare_backend(&mut app, stack).map_err(|e| e.to_string())?;
    app.synthesize().cloned().map_err(|e| e.to_string())
}

fn cmd_synth(config: AppConfig, stack: &str) -> Result<(), String> {
    let environment = config.environment;
    let artifacts = synth(config, stack)?;
    let digests = digest::artifact_digests(&artifacts)?;

    println!("Synthesized {} ({})", stack, environment);
    for (path, hash) in &digests {
        println!("  {}  {}", hash, path.display());
    }
    println!();
    println!(
        "{} services, {} templates, run digest {}",
        artifacts.service_order.len(),
        artifacts.templates.len(),
        digest::run_digest(&digests)
    );
    Ok(())
}

/// Services in start order, each with the services it waits for.
fn graph_lines(config: AppConfig, stack: &str) -> Result<Vec<String>, String> {
    let mut app = App::new(config);
    backend::declare_backend(&mut app, stack).map_err(|e| e.to_string())?;
    let manifest = app.manifest();
    let order = wiring::service_order(manifest).map_err(|e| e.to_string())?;

    let mut lines = Vec::new();
    for name in &order {
        let owner = manifest.owner(name).unwrap_or("?");
        lines.push(format!("{} ({})", name, owner));
        for (dep, condition) in manifest.dependencies(name) {
            lines.push(format!("  <- {} [{}]", dep, condition));
        }
    }
    Ok(lines)
}

fn cmd_graph(config: AppConfig, stack: &str) -> Result<(), String> {
    for line in graph_lines(config, stack)? {
        println!("{}", line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tw030_init() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("new-project");
        cmd_init(&sub).unwrap();
        assert!(sub.join("twinform.yaml").exists());
        cmd_validate(&sub.join("twinform.yaml")).unwrap();
    }

    #[test]
    fn test_tw030_init_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("twinform.yaml"), "exists").unwrap();
        assert!(cmd_init(dir.path()).is_err());
    }

    #[test]
    fn test_tw030_validate_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("twinform.yaml");
        std::fs::write(&file, "version: \"0.9\"\n").unwrap();
        assert!(cmd_validate(&file).is_err());
    }

    #[test]
    fn test_tw030_synth_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::for_root(dir.path(), Environment::Development);
        let artifacts = synth(config, DEFAULT_STACK).unwrap();
        assert_eq!(artifacts.manifest, dir.path().join("docker/docker-compose.yml"));
        assert_eq!(
            artifacts.templates,
            vec![dir.path().join("cdk.out/BackendStack.template.json")]
        );
        assert!(digest::artifact_digests(&artifacts).is_ok());
    }

    #[test]
    fn test_tw030_graph_lines() {
        let config = AppConfig::for_root(Path::new("/proj"), Environment::Development);
        let lines = graph_lines(config, DEFAULT_STACK).unwrap();
        let first = lines.iter().position(|l| l.contains("(BackendStack/LambdaEmulator)")).unwrap();
        let sfe = lines
            .iter()
            .position(|l| l.contains("(BackendStack/StepFunctionEmulator)"))
            .unwrap();
        assert!(first < sfe);
        assert!(lines.iter().any(|l| l.contains("[service_completed_successfully]")));
    }

    #[test]
    fn test_tw030_cli_parses() {
        let cli = Cli::try_parse_from(["twinform", "synth", "--env", "production", "--out", "build"]).unwrap();
        match cli.command {
            Commands::Synth { build, out, .. } => {
                assert_eq!(build.env.as_deref(), Some("production"));
                assert_eq!(build.stack, DEFAULT_STACK);
                assert_eq!(out, Some(PathBuf::from("build")));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
