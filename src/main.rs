//! # logset-operator
//!
//! Entry point. Loads configuration, initialises tracing and dispatches the
//! requested command.
//!
//! ## Shutdown
//!
//! `run` stops on SIGTERM/SIGINT; in-flight passes finish first.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use anyhow::{Context, Result};
use clap::Parser;
use kube::{Client, CustomResourceExt};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use logset_api::LogSet;
use logset_operator::cli::{Cli, Commands};
use logset_operator::config::{Config, LogConfig};
use logset_operator::controller;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Crd => {
            let crd = serde_yaml::to_string(&LogSet::crd()).context("Failed to render CRD")?;
            print!("{crd}");
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
        Commands::Run { namespace } => {
            let config = config.with_namespace(namespace);
            init_tracing(&config.log);
            info!(version = env!("CARGO_PKG_VERSION"), "logset-operator starting");

            let client = Client::try_default()
                .await
                .context("Failed to create Kubernetes client. Check KUBECONFIG or in-cluster credentials")?;
            controller::run(client, &config).await;
        }
    }
    Ok(())
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let registry = tracing_subscriber::registry().with(filter);
    if log.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
