//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// LogSet operator
#[derive(Parser, Debug)]
#[command(name = "logset-operator")]
#[command(version)]
#[command(about = "Reconciles LogSet resources into running log-service clusters")]
pub struct Cli {
    /// Configuration file (TOML). Defaults apply when absent.
    #[arg(short, long, global = true, env = "LOGSET_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the controller against the current cluster
    Run {
        /// Only watch this namespace
        #[arg(short, long, env = "LOGSET_NAMESPACE")]
        namespace: Option<String>,
    },

    /// Print the LogSet CustomResourceDefinition as YAML
    Crd,

    /// Print the effective configuration
    Config,
}
