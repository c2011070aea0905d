//! Tenant KB - multi-tenant knowledge bases with quota governance.

mod cli;
mod commands;
mod governance;
mod indexer;
mod local;
mod quota;
mod retry;
mod services;
mod tenancy;
mod types;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Controlled by RUST_LOG
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    cli.execute().await
}
