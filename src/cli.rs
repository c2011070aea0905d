//! CLI argument definitions.

use clap::{Parser, Subcommand};

use crate::commands::{
    AddCmd, ConfigCmd, DocsCmd, ImageCmd, InitCmd, PlanCmd, QueryCmd, QuotaCmd,
};

#[derive(Parser)]
#[command(name = "tkb")]
#[command(about = "Tenant KB - per-tenant knowledge bases with quota governance")]
#[command(version)]
pub struct Cli {
    /// Tenant to act for
    #[arg(long, global = true, env = "TKB_TENANT")]
    pub tenant: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the .tkb data directory
    Init(InitCmd),

    /// Add a text document to the knowledge base
    Add(AddCmd),

    /// Ask a question against the knowledge base
    Query(QueryCmd),

    /// List or delete documents
    Docs(DocsCmd),

    /// Upload, analyze, list or delete images
    Image(ImageCmd),

    /// Show plan limits and current usage
    Quota(QuotaCmd),

    /// Move the tenant to another plan (free, basic, premium)
    Plan(PlanCmd),

    /// Manage configuration (API key, models, etc.)
    Config(ConfigCmd),
}

impl Cli {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let tenant = self.tenant.as_deref();
        match &self.command {
            Command::Init(cmd) => cmd.run().await,
            Command::Add(cmd) => cmd.run(tenant).await,
            Command::Query(cmd) => cmd.run(tenant).await,
            Command::Docs(cmd) => cmd.run(tenant).await,
            Command::Image(cmd) => cmd.run(tenant).await,
            Command::Quota(cmd) => cmd.run(tenant).await,
            Command::Plan(cmd) => cmd.run(tenant).await,
            Command::Config(cmd) => cmd.run().await,
        }
    }
}
