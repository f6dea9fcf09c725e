#![recursion_limit = "256"]

mod cli;
mod application;
mod domain;
mod data;
mod ml;
mod infra;

use anyhow::Result;
use cli::Cli;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("erc_train=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // An Err here prints the context chain and exits with status 1.
    Cli::parse().run()
}
