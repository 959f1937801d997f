//! Observer setup CLI
//!
//! Entry point for the `observer-setup` command-line tool.

use clap::{Parser, Subcommand};
use observer_setup::{
    ArchiveKind, ArchiveSource, Experiment, ExperimentArchive, Loader, NodeProfile,
    NodeProfileArchive, SetupConfig, Workspace,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "observer-setup")]
#[command(about = "Load and validate observer experiment and node profile archives", version)]
struct Cli {
    /// Path to settings file (default: observer-setup.toml when present)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Directory in which workspaces are created
    #[arg(long, global = true)]
    workspace_dir: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load an experiment (behavior) archive
    Experiment {
        /// Path to the .tar.gz archive
        archive: PathBuf,

        /// Keep the workspace instead of removing it before exit
        #[arg(long)]
        keep: bool,
    },

    /// Load a node profile archive
    Profile {
        /// Path to the .tar.gz archive
        archive: PathBuf,

        /// Keep the workspace instead of removing it before exit
        #[arg(long)]
        keep: bool,
    },

    /// Print the effective settings as TOML
    Config,
}

fn main() {
    let cli = Cli::parse();

    let config = match SetupConfig::load_or_default(cli.config.as_deref()) {
        Ok(c) => c.with_workspace_dir(cli.workspace_dir),
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    init_logging(&config);

    match cli.command {
        Commands::Experiment { archive, keep } => {
            run_load::<ExperimentArchive>(&config, archive, keep, cli.json, print_experiment);
        }
        Commands::Profile { archive, keep } => {
            run_load::<NodeProfileArchive>(&config, archive, keep, cli.json, print_profile);
        }
        Commands::Config => run_config(&config),
    }
}

/// Log to stderr; `RUST_LOG` wins over the configured filter.
fn init_logging(config: &SetupConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_load<K>(
    config: &SetupConfig,
    archive: PathBuf,
    keep: bool,
    json: bool,
    print_human: fn(&K::Output),
) where
    K: ArchiveKind,
    K::Output: Serialize,
{
    let mut loader = match Loader::<K>::new(&config.workspace) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let result = loader.load(ArchiveSource::from_path(archive));

    let output = result.map(|output| {
        if json {
            serde_json::to_string_pretty(&output).map_err(|e| e.to_string())
        } else {
            print_human(&output);
            print_extracted(loader.workspace(), keep);
            Ok(String::new())
        }
    });

    let workspace = loader.workspace().path().to_path_buf();
    if keep {
        info!(path = %workspace.display(), "workspace kept");
    } else if let Err(e) = loader.release() {
        eprintln!("Warning: {}", e);
    }

    match output {
        Ok(Ok(text)) => {
            if !text.is_empty() {
                println!("{}", text);
            }
        }
        Ok(Err(e)) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn print_experiment(experiment: &Experiment) {
    println!("Experiment loaded: {}", experiment.archive.path.display());
    println!();
    if let Some(ref node_id) = experiment.node_id {
        println!("  Node: {}", node_id);
    }
    println!("  SHA-256: {}", experiment.archive.sha256);
    println!("  Firmwares: {}", experiment.firmwares.len());
    for (id, path) in &experiment.firmwares {
        println!("    {:<16} {}", id, path.display());
    }
    println!("  Schedule entries: {}", experiment.schedule.len());
}

fn print_profile(profile: &NodeProfile) {
    println!("Node profile loaded: {}", profile.archive.path.display());
    println!();
    println!("  SHA-256: {}", profile.archive.sha256);
    println!("  Commands:");
    for (name, command) in &profile.commands {
        println!("    {:<8} {}", name, command);
    }
    println!("  Executables: {}", profile.executables.len());
    println!("  Configuration files: {}", profile.configuration_files.len());
    println!(
        "  Serial: {} @ {} baud ({})",
        profile.serial.port,
        profile.serial.baudrate,
        profile.serial.module.display()
    );
}

/// Count the files the archive unpacked, listing them when the workspace
/// is kept for inspection.
fn print_extracted(workspace: &Workspace, keep: bool) {
    match workspace.extracted_files() {
        Ok(files) => {
            println!("  Extracted files: {}", files.len());
            if keep {
                println!("  Workspace: {}", workspace.path().display());
                for file in &files {
                    println!("    {}", file.display());
                }
            }
        }
        Err(e) => eprintln!("Warning: {}", e),
    }
}

fn run_config(config: &SetupConfig) {
    match config.to_toml() {
        Ok(text) => print!("{}", text),
        Err(e) => {
            eprintln!("Error rendering settings: {}", e);
            process::exit(1);
        }
    }
}
