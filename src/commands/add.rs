//! Add command - index a text document for a tenant.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::context::{self, Models};
use crate::governance::AddDocumentRequest;

#[derive(Args)]
pub struct AddCmd {
    /// Document title
    #[arg(short, long)]
    pub title: String,

    /// Text file to add
    #[arg(conflicts_with = "text", required_unless_present = "text")]
    pub file: Option<PathBuf>,

    /// Document text given inline
    #[arg(long)]
    pub text: Option<String>,
}

impl AddCmd {
    pub async fn run(&self, tenant: Option<&str>) -> Result<()> {
        let tenant = context::tenant(tenant)?;

        let (text, filename) = match (&self.file, &self.text) {
            (Some(path), _) => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned());
                (text, filename)
            }
            (None, Some(text)) => (text.clone(), None),
            (None, None) => anyhow::bail!("Give a file or --text"),
        };

        let governance = context::open_governance(Models::Required).await?;
        let start = std::time::Instant::now();
        let response = governance
            .add_document(
                tenant,
                AddDocumentRequest {
                    title: self.title.clone(),
                    text,
                    filename,
                },
            )
            .await
            .map_err(context::report)?;

        println!(
            "Added \"{}\" ({}): {} vectors, {:.4} MB in {}ms",
            response.title,
            response.document_id,
            response.vector_count,
            response.size_mb,
            start.elapsed().as_millis()
        );
        for overage in &response.overages {
            println!(
                "warning: {} is now {} of {}",
                overage.dimension,
                overage.dimension.format_amount(overage.current),
                overage.limit
            );
        }

        Ok(())
    }
}
