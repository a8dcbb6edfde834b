mod cli;
mod config;
mod convert;
mod logging;
mod news_cmd;
mod run_cmd;

use std::process;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};

/// Series catalog file in the data directory.
const CATALOG_FILE: &str = "series.parquet";
/// Nowcast history file in the output directory.
const NOWCAST_FILE: &str = "nowcast.parquet";
/// News history file in the output directory.
const NEWS_FILE: &str = "news.parquet";

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Run(args) => run_cmd::run(args),
        Command::News(args) => news_cmd::run(args),
    }
}
