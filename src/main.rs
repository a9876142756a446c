//! docker-g5k - Docker clusters on Grid'5000
//!
//! This is the main CLI entry point for docker-g5k.

use clap::{Parser, Subcommand};
use docker_g5k::command::{self, CreateClusterArgs, RemoveClusterArgs};
use docker_g5k::error::Result;
use tracing_subscriber::EnvFilter;

/// docker-g5k - Docker clusters on Grid'5000
#[derive(Parser)]
#[command(name = "docker-g5k")]
#[command(version)]
#[command(about = "Create and remove Docker clusters on the Grid'5000 infrastructure", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new Docker cluster on Grid'5000
    CreateCluster(CreateClusterArgs),

    /// Remove Docker clusters and kill their Grid'5000 jobs
    #[command(alias = "rm-cluster")]
    RemoveCluster(RemoveClusterArgs),

    /// List clusters and their machines
    #[command(aliases = ["ls-cluster", "ls"])]
    ListCluster,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::CreateCluster(args) => command::create_cluster::run(args).await,
        Commands::RemoveCluster(args) => command::remove_cluster::run(args).await,
        Commands::ListCluster => command::list_cluster::run().await,
    }
}
