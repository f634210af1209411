//! Cluster Controller
//!
//! Provisions, scales, upgrades and tears down Kubernetes clusters
//! across cloud providers. Cluster and node-group declarations live in
//! a local store; `apply` reconciles one cluster on demand and `run`
//! keeps every stored cluster converged.

mod actions;
mod admin;
mod backoff;
mod controller;
mod error;
mod namer;
mod node_groups;
mod reconciler;
mod registry;
mod startup;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cluster_store::LocalStore;
use controller::Controller;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "cluster-controller", version, about)]
struct Cli {
    /// Root directory of the local cluster store
    #[arg(long, env = "HARROW_STORE", default_value = ".harrow")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile one cluster and print the resulting actions
    Apply {
        /// Name of the cluster to reconcile
        #[arg(long)]
        cluster: String,

        /// Preview the actions without touching the provider
        #[arg(long)]
        dry_run: bool,
    },

    /// Continuously reconcile every stored cluster
    Run {
        /// Seconds between resync sweeps
        #[arg(long, default_value_t = 60)]
        resync: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    info!(store = %cli.store.display(), "starting cluster controller");

    let store = Arc::new(LocalStore::new(cli.store));
    let controller = Controller::new(store);

    match cli.command {
        Commands::Apply { cluster, dry_run } => {
            let actions = controller.apply_cluster(&cluster, dry_run).await?;
            print!("{}", serde_yaml::to_string(&actions)?);
        }
        Commands::Run { resync } => {
            controller.run(Duration::from_secs(resync)).await?;
        }
    }

    Ok(())
}
