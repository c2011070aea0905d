//! Docs command - list, delete and inspect a tenant's documents.

use anyhow::Result;
use clap::{Args, Subcommand};

use super::context::{self, Models};
use crate::indexer::TextChunk;
use crate::local::{DocumentSort, ListQuery, SortOrder};

#[derive(Args)]
pub struct DocsCmd {
    #[command(subcommand)]
    pub command: DocsSubCmd,
}

#[derive(Subcommand)]
pub enum DocsSubCmd {
    /// List documents
    List(DocsListCmd),

    /// Delete a document and its vectors
    Delete(DocsDeleteCmd),

    /// Show the indexed chunks of documents and images
    Chunks(DocsChunksCmd),
}

#[derive(Args)]
pub struct DocsListCmd {
    /// Page size (1-100)
    #[arg(short, long, default_value = "20")]
    pub limit: u32,

    #[arg(long, default_value = "0")]
    pub offset: u32,

    /// Title substring
    #[arg(short, long)]
    pub search: Option<String>,

    #[arg(long, value_enum, default_value_t = DocumentSort::CreatedAt)]
    pub sort_by: DocumentSort,

    #[arg(long, value_enum, default_value_t = SortOrder::Desc)]
    pub sort_order: SortOrder,
}

#[derive(Args)]
pub struct DocsDeleteCmd {
    /// Document id
    pub id: String,
}

#[derive(Args)]
pub struct DocsChunksCmd {
    /// Only chunks of this document or image id
    pub id: Option<String>,
}

impl DocsCmd {
    pub async fn run(&self, tenant: Option<&str>) -> Result<()> {
        let tenant = context::tenant(tenant)?;
        let governance = context::open_governance(Models::Unused).await?;

        match &self.command {
            DocsSubCmd::List(cmd) => {
                let query = ListQuery {
                    limit: cmd.limit,
                    offset: cmd.offset,
                    search: cmd.search.clone(),
                    tag: None,
                    sort_by: cmd.sort_by,
                    sort_order: cmd.sort_order,
                };
                let page = governance
                    .list_documents(tenant, &query)
                    .await
                    .map_err(context::report)?;

                if page.items.is_empty() {
                    println!("No documents.");
                    return Ok(());
                }

                println!("{:<38} {:<30} {:>8} {:>10}  created", "id", "title", "vectors", "MB");
                for doc in &page.items {
                    println!(
                        "{:<38} {:<30} {:>8} {:>10.4}  {}",
                        doc.id,
                        truncate(&doc.title, 30),
                        doc.vector_count,
                        doc.size_mb,
                        doc.created_at
                    );
                }
                println!();
                println!(
                    "{} of {} documents{}",
                    page.items.len(),
                    page.total,
                    if page.has_more { " (more available)" } else { "" }
                );
            }
            DocsSubCmd::Delete(cmd) => {
                let row = governance
                    .delete_document(tenant, &cmd.id)
                    .await
                    .map_err(context::report)?;
                println!(
                    "Deleted \"{}\" ({} vectors removed)",
                    row.title, row.vector_count
                );
            }
            DocsSubCmd::Chunks(cmd) => {
                let mut chunks = governance
                    .knowledge(tenant)
                    .await
                    .map_err(context::report)?;
                if let Some(ref id) = cmd.id {
                    chunks.retain(|c| &c.document_id == id);
                }
                chunks.sort_by(|a, b| a.key.cmp(&b.key));

                if chunks.is_empty() {
                    println!("No indexed chunks.");
                    return Ok(());
                }

                for chunk in &chunks {
                    println!("{} [{}] {}", chunk.key, chunk.source_type, chunk.title);
                    println!("    {}", TextChunk::snippet(&chunk.text, 120).replace('\n', " "));
                }
                println!();
                println!("{} chunks", chunks.len());
            }
        }

        Ok(())
    }
}

pub(super) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
