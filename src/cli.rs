use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// Dynamic factor model nowcasting with news decomposition.
#[derive(Parser)]
#[command(
    name = "nowcast",
    version,
    about = "Mixed-frequency dynamic factor model nowcasting"
)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Process every vintage in the data directory and update the history tables.
    Run(RunArgs),
    /// Decompose the forecast revision between two vintages into news.
    News(NewsArgs),
}

/// Arguments for the `run` subcommand.
#[derive(clap::Args)]
pub struct RunArgs {
    /// Path to TOML configuration file.
    #[arg(short, long, default_value = "nowcast.toml")]
    pub config: PathBuf,

    /// Override the data directory from config.
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Override the output directory from config.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Ignore history tables already in the output directory.
    #[arg(long)]
    pub fresh: bool,
}

/// Arguments for the `news` subcommand.
#[derive(clap::Args)]
pub struct NewsArgs {
    /// Path to TOML configuration file.
    #[arg(short, long, default_value = "nowcast.toml")]
    pub config: PathBuf,

    /// Override the data directory from config.
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Release date of the earlier vintage (YYYY-MM-DD).
    #[arg(long)]
    pub previous: NaiveDate,

    /// Release date of the later vintage (YYYY-MM-DD).
    #[arg(long)]
    pub current: NaiveDate,

    /// Target variables; defaults to the configured targets.
    #[arg(short, long, value_delimiter = ',')]
    pub targets: Vec<String>,

    /// Quarter to decompose (YYYYQn); defaults to the current vintage's quarter.
    #[arg(short, long)]
    pub quarter: Option<String>,

    /// Write the JSON report here instead of stdout.
    #[arg(long)]
    pub json: Option<PathBuf>,
}
