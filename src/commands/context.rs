//! Shared setup for commands that act on a tenant.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use secrecy::SecretString;

use crate::governance::Governance;
use crate::local::{self, AppConfig, DataPaths, LocalDb, LocalStorage, VectorStore};
use crate::quota::{QuotaLedger, UsageWindow};
use crate::retry::ResilientInvoker;
use crate::services::OpenAiClient;
use crate::types::GovernanceError;

use super::quota::print_status;

pub type LocalGovernance = Governance<VectorStore, OpenAiClient>;

/// Which model access a command needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Models {
    Required,
    Unused,
}

/// Open the governance facade over the nearest `.tkb/` directory.
pub async fn open_governance(models: Models) -> Result<LocalGovernance> {
    let data_dir =
        local::get_data_dir().context("No .tkb directory found. Run `tkb init` first.")?;
    let paths = DataPaths::new(data_dir);

    let config = AppConfig::load()?;
    let api_key = match (config.api_key_secret(), models) {
        (Some(key), _) if config.has_api_key() => key,
        (_, Models::Required) => {
            anyhow::bail!("API key not configured. Run: tkb config set-key <key>")
        }
        (_, Models::Unused) => SecretString::from(String::new()),
    };

    let db = LocalDb::open(&paths.ledger()).await?;
    let ledger = QuotaLedger::new(db.clone(), Arc::new(config.catalog()?), UsageWindow::system());
    let storage = LocalStorage::new(paths.blobs()).await?;
    let vectors = VectorStore::open(&paths.vectors()).await?;
    let client = OpenAiClient::new(&config, api_key);

    Ok(Governance::new(ledger, db, storage, vectors, client)
        .with_invoker(ResilientInvoker::new(config.retry_policy()))
        .with_default_top_k(config.default_top_k))
}

/// The tenant a command acts for.
pub fn tenant(tenant: Option<&str>) -> Result<&str> {
    tenant.context("No tenant given. Pass --tenant <id> or set TKB_TENANT.")
}

/// Turn a governance failure into a command error, printing the quota
/// snapshot that comes with a denial.
pub fn report(err: GovernanceError) -> anyhow::Error {
    if let Some(status) = err.quota_status() {
        eprintln!();
        print_status(status);
    }
    anyhow!(err.public_message())
}
