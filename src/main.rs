mod auth;
mod cli;
mod config;
mod document;
mod error;
mod github;
mod output;
mod prow;
mod render;
mod testgrid;
mod value;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting prowgen");
    cli.execute().await?;

    Ok(())
}
