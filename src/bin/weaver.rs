//! Weaver CLI: AI-assisted note-vault linking.
//!
//! Usage:
//!   weaver start <vault> [--config path] [--batch]
//!   weaver folder <path> [--config path]
//!   weaver config-folders [--config path]
//!   weaver keywords <folder> [--config path]
//!   weaver rebuild-graph <vault> [--config path]
//!   weaver init-config [path]

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use weaver::pipeline::watch_vault;
use weaver::{
    InferenceClient, KnowledgeGraph, PipelineError, ShutdownToken, VaultPipeline, WeaverConfig,
};

#[derive(Parser)]
#[command(name = "weaver", version, about = "AI-assisted note-vault linking engine")]
struct Cli {
    /// Configuration file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a vault and process notes as they change
    Start {
        /// Vault root directory
        vault: PathBuf,
        /// Run one batch pass over the vault instead of watching
        #[arg(long)]
        batch: bool,
    },
    /// Run the relation pass over one folder
    Folder {
        /// Folder to process
        path: PathBuf,
    },
    /// Run the relation pass over every configured scan folder
    ConfigFolders,
    /// Run the keyword-linking pass over a folder
    Keywords {
        /// Folder to process
        folder: PathBuf,
    },
    /// Rebuild the knowledge graph from annotated notes
    RebuildGraph {
        /// Vault root directory
        vault: PathBuf,
    },
    /// Write a starter configuration file
    InitConfig {
        /// Destination (defaults to the platform config dir)
        path: Option<PathBuf>,
    },
}

fn build_pipeline(config: &WeaverConfig) -> Arc<VaultPipeline> {
    let client = InferenceClient::from_config(&config.oracle, config.relations.vocabulary());
    let graph = KnowledgeGraph::open(config.resolved_graph_path());
    Arc::new(VaultPipeline::new(config, client, graph))
}

fn cmd_init_config(path: Option<PathBuf>) -> i32 {
    let path = path.unwrap_or_else(WeaverConfig::default_config_path);
    if path.exists() {
        eprintln!("Error: '{}' already exists", path.display());
        return 1;
    }
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("Error: cannot create '{}': {}", parent.display(), e);
            return 1;
        }
    }
    match WeaverConfig::write_default(&path) {
        Ok(()) => {
            println!("Wrote starter config to '{}'", path.display());
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_start(config: &WeaverConfig, vault: PathBuf, batch: bool) -> Result<(), PipelineError> {
    let pipeline = build_pipeline(config);
    if batch {
        pipeline.process_vault(&vault).await?;
        return Ok(());
    }

    let shutdown = ShutdownToken::new();
    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("shutting down...");
            ctrl_c_shutdown.cancel();
        }
    });
    watch_vault(pipeline, vault, shutdown).await
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Commands::InitConfig { path } = cli.command {
        std::process::exit(cmd_init_config(path));
    }

    let config_path = cli.config.unwrap_or_else(WeaverConfig::default_config_path);
    let config = WeaverConfig::load(Some(&config_path));

    let result = match cli.command {
        Commands::Start { vault, batch } => cmd_start(&config, vault, batch).await,
        Commands::Folder { path } => {
            let pipeline = build_pipeline(&config);
            pipeline.process_folder(&path).await.map(|report| {
                println!(
                    "Processed {} files: {} resolved, {} skipped, {} failed",
                    report.files, report.resolved, report.skipped, report.failed
                );
            })
        }
        Commands::ConfigFolders => {
            let pipeline = build_pipeline(&config);
            pipeline.process_config_folders().await.map(|report| {
                println!(
                    "Processed {} files across configured folders: {} resolved",
                    report.files, report.resolved
                );
            })
        }
        Commands::Keywords { folder } => {
            let pipeline = build_pipeline(&config);
            pipeline.process_keywords(&folder).await.map(|report| {
                println!(
                    "Scanned {} files: {} groups, {} verified, {} links added",
                    report.files, report.groups, report.verified, report.links_added
                );
            })
        }
        Commands::RebuildGraph { vault } => {
            let pipeline = build_pipeline(&config);
            pipeline.rebuild_graph(&vault).await.map(|report| {
                println!(
                    "Rebuilt graph from {} files: {} edges, {} unrecoverable lines",
                    report.files, report.edges, report.unrecoverable
                );
            })
        }
        Commands::InitConfig { .. } => unreachable!("handled before config load"),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
