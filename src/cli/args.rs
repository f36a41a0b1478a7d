//! CLI argument parsing using clap.
//!
//! Contains the Cli struct, Commands enum, and the shared run arguments.

use clap::{
    Args, Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

#[derive(Parser, Debug)]
#[command(name = "clusterfetch")]
#[command(version)]
#[command(about = "Cluster page-access vectors and score cluster-based prefetching")]
#[command(styles = clap_cargo_style())]
pub struct Cli {
    /// Settings file (defaults to the nearest .clusterfetch/settings.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create .clusterfetch/settings.toml with default values
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    Config,

    /// Train k-means and evaluate prefetching on the test set
    Kmeans {
        #[command(flatten)]
        run: RunArgs,

        /// Number of clusters (overrides config)
        #[arg(short)]
        k: Option<usize>,

        /// Iteration cap (overrides config)
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Look up test row i in the membership of training row i instead of
        /// assigning it to the nearest prototype
        #[arg(long)]
        training_index: bool,
    },

    /// Train a Kohonen map and evaluate prefetching on the test set
    Som {
        #[command(flatten)]
        run: RunArgs,

        /// Grid side length (overrides config)
        #[arg(long)]
        grid: Option<usize>,

        /// Number of training epochs (overrides config)
        #[arg(long)]
        epochs: Option<usize>,

        /// Initial learning rate in (0, 1] (overrides config)
        #[arg(long)]
        learning_rate: Option<f64>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Training vectors, one per line
    #[arg(long)]
    pub train: PathBuf,

    /// Test vectors, same dimension as training
    #[arg(long)]
    pub test: PathBuf,

    /// Prefetch threshold (overrides config)
    #[arg(short, long)]
    pub threshold: Option<f64>,

    /// Random seed (overrides config)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Emit the report as JSON
    #[arg(long)]
    pub json: bool,

    /// List the training indices in every cluster
    #[arg(long)]
    pub show_members: bool,

    /// Print every prototype vector
    #[arg(long)]
    pub show_prototypes: bool,
}
