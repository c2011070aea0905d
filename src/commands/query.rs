//! Query command - ask a question against a tenant's knowledge.

use anyhow::Result;
use clap::Args;

use super::context::{self, Models};
use crate::governance::{QueryRequest, QueryScope};

#[derive(Args)]
pub struct QueryCmd {
    /// Natural language question
    pub question: String,

    /// Knowledge to search
    #[arg(long, value_enum, default_value_t = QueryScope::All)]
    pub scope: QueryScope,

    /// Chunks to retrieve (default from config)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Sampling temperature of the answer
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Assistant persona replacing the default one
    #[arg(long)]
    pub persona: Option<String>,

    /// Print the response as JSON
    #[arg(long)]
    pub json: bool,
}

impl QueryCmd {
    pub async fn run(&self, tenant: Option<&str>) -> Result<()> {
        let tenant = context::tenant(tenant)?;
        let governance = context::open_governance(Models::Required).await?;

        let response = governance
            .query(
                tenant,
                QueryRequest {
                    question: self.question.clone(),
                    top_k: self.top_k,
                    temperature: self.temperature,
                    persona: self.persona.clone(),
                    scope: self.scope,
                },
            )
            .await
            .map_err(context::report)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&response)?);
            return Ok(());
        }

        println!("{}", response.answer);
        if response.sources.is_empty() {
            return Ok(());
        }

        println!();
        println!("Sources (confidence {:.2}):", response.confidence);
        for (i, s) in response.sources.iter().enumerate() {
            println!(
                "{}. {} [{}] {} (relevance: {:.2})",
                i + 1,
                s.title,
                s.source_type,
                s.document_id,
                s.relevance
            );
            let snippet: String = s.snippet.lines().take(3).collect::<Vec<_>>().join("\n   ");
            println!("   {}", snippet);
        }

        Ok(())
    }
}
