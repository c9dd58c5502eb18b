#![recursion_limit = "256"]

mod cli;
mod application;
mod domain;
mod data;
mod ml;
mod infra;

use std::path::Path;

use anyhow::Result;
use cli::Cli;
use clap::Parser;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = infra::logging::init(Path::new(&cli.log_dir))?;
    tracing::info!("Started Logging to '{}'", log_file.display());

    cli.run()
}
