//! Retrieval-augmented question answering over a tenant's knowledge.

use anyhow::Context;
use serde::Serialize;
use tracing::info;

use super::{Governance, require};
use crate::indexer::TextChunk;
use crate::local::{SOURCE_DOCUMENT, SOURCE_IMAGE, VectorIndex, VectorSearchHit};
use crate::services::{Completer, Completion, ContentAnalyzer, Embedder};
use crate::tenancy;
use crate::types::{GovernanceError, QuotaDimension, UsageDelta};

const BASE_PERSONA: &str = "You are a helpful, knowledgeable personal assistant.";
const ANSWER_INSTRUCTION: &str =
    "Answer based on the content of the reference documents provided.";
const NO_CONTEXT_ANSWER: &str =
    "I could not find anything in your knowledge base related to this question.";

/// Default sampling temperature of answers.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Source characters shown per cited chunk.
const SNIPPET_CHARS: usize = 200;

/// Which knowledge a query searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum QueryScope {
    #[default]
    All,
    Documents,
    Images,
}

impl QueryScope {
    fn source_type(&self) -> Option<&'static str> {
        match self {
            QueryScope::All => None,
            QueryScope::Documents => Some(SOURCE_DOCUMENT),
            QueryScope::Images => Some(SOURCE_IMAGE),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub question: String,
    /// Chunks to retrieve; the configured default when unset
    pub top_k: Option<usize>,
    pub temperature: Option<f32>,
    /// Replaces the base assistant line of the system prompt
    pub persona: Option<String>,
    pub scope: QueryScope,
}

/// A retrieved chunk cited by an answer.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub document_id: String,
    pub title: String,
    pub source_type: String,
    pub relevance: f32,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<Source>,
    /// Share of the requested chunks that were found, capped at 1
    pub confidence: f64,
}

#[derive(Serialize)]
#[serde(rename = "documents")]
struct ContextDocuments<'a> {
    document: Vec<ContextDocument<'a>>,
}

#[derive(Serialize)]
struct ContextDocument<'a> {
    title: &'a str,
    text: &'a str,
}

impl<V, M> Governance<V, M>
where
    V: VectorIndex,
    M: Embedder + Completer + ContentAnalyzer,
{
    /// Answer a question from the tenant's own knowledge. Consumes one
    /// monthly query.
    pub async fn query(
        &self,
        tenant_id: &str,
        request: QueryRequest,
    ) -> Result<QueryResponse, GovernanceError> {
        require(&request.question, "question")?;
        let partition = tenancy::resolve(tenant_id)?;
        let top_k = request.top_k.unwrap_or(self.default_top_k).max(1);

        let charge = [UsageDelta::one(QuotaDimension::MonthlyQueries)];
        let reservation = self.ledger.reserve(tenant_id, &charge).await?;

        let result = async {
            let question = vec![request.question.trim().to_string()];
            let vector = self
                .embed(&question)
                .await?
                .pop()
                .unwrap_or_default();

            let hits = self
                .vectors
                .query(
                    partition.as_str(),
                    &vector,
                    top_k,
                    request.scope.source_type(),
                )
                .await
                .map_err(GovernanceError::unavailable)?;
            let hits = tenancy::filter_owned(hits, tenant_id);

            let answer = if hits.is_empty() {
                NO_CONTEXT_ANSWER.to_string()
            } else {
                let completion = Completion {
                    system_prompt: system_prompt(request.persona.as_deref()),
                    user_prompt: user_prompt(&hits, &request.question)?,
                    temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                };
                self.invoker
                    .invoke(|| self.models.complete(&completion))
                    .await?
            };

            Ok::<_, GovernanceError>((answer, hits))
        }
        .await;

        let (answer, hits) = match result {
            Ok(found) => found,
            Err(e) => return Err(self.abort(reservation, e).await),
        };
        self.ledger.settle(reservation, &charge).await?;

        let sources: Vec<Source> = hits.iter().map(source).collect();
        let confidence = (sources.len() as f64 / top_k as f64).min(1.0);
        info!(
            tenant = tenant_id,
            sources = sources.len(),
            top_k,
            "Query answered"
        );

        Ok(QueryResponse {
            answer,
            sources,
            confidence,
        })
    }
}

fn system_prompt(persona: Option<&str>) -> String {
    let base = persona
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(BASE_PERSONA);
    format!("{}\n{}", base, ANSWER_INSTRUCTION)
}

fn user_prompt(hits: &[VectorSearchHit], question: &str) -> Result<String, GovernanceError> {
    let context = ContextDocuments {
        document: hits
            .iter()
            .map(|hit| ContextDocument {
                title: &hit.metadata.title,
                text: &hit.metadata.text,
            })
            .collect(),
    };
    let xml = quick_xml::se::to_string(&context).context("Failed to render query context")?;

    Ok(format!(
        "# Reference documents\n{}\n# Question\n{}",
        xml,
        question.trim()
    ))
}

fn source(hit: &VectorSearchHit) -> Source {
    Source {
        document_id: hit.metadata.document_id.clone(),
        title: hit.metadata.title.clone(),
        source_type: hit.metadata.source_type.clone(),
        relevance: hit.score(),
        snippet: TextChunk::snippet(&hit.metadata.text, SNIPPET_CHARS),
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::governance::AddDocumentRequest;
    use crate::local::{VectorMetadata, VectorRecord};
    use tempfile::tempdir;

    fn question(text: &str) -> QueryRequest {
        QueryRequest {
            question: text.to_string(),
            ..Default::default()
        }
    }

    async fn add(gov: &TestGovernance, tenant: &str, title: &str, text: &str) {
        gov.add_document(
            tenant,
            AddDocumentRequest {
                title: title.to_string(),
                text: text.to_string(),
                filename: None,
            },
        )
        .await
        .unwrap();
    }

    #[test]
    fn test_system_prompt_persona() {
        assert!(system_prompt(None).starts_with(BASE_PERSONA));
        let prompt = system_prompt(Some("You are a pirate."));
        assert!(prompt.starts_with("You are a pirate.\n"));
        assert!(prompt.ends_with(ANSWER_INSTRUCTION));
        assert!(system_prompt(Some("  ")).starts_with(BASE_PERSONA));
    }

    #[tokio::test]
    async fn test_query_answers_from_own_documents() {
        let dir = tempdir().unwrap();
        let gov = governance(dir.path(), FakeIndex::default(), FakeModels::default()).await;
        add(&gov, "alice", "Holidays", "The office is closed on Fridays.").await;

        let response = gov.query("alice", question("When is the office closed?")).await.unwrap();
        assert_eq!(response.answer, "Answer from context");
        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.sources[0].title, "Holidays");
        assert_eq!(response.sources[0].relevance, 1.0);
        assert!((response.confidence - 1.0 / 3.0).abs() < 1e-9);

        let prompt = gov.models.last_prompt.lock().unwrap().clone().unwrap();
        assert_eq!(prompt.temperature, DEFAULT_TEMPERATURE);
        assert!(prompt.user_prompt.contains(
            "<documents><document><title>Holidays</title><text>The office is closed on Fridays.</text></document></documents>"
        ));
        assert!(prompt.user_prompt.ends_with("# Question\nWhen is the office closed?"));

        let status = gov.status("alice").await.unwrap();
        assert_eq!(status.current(QuotaDimension::MonthlyQueries), 1.0);
    }

    #[tokio::test]
    async fn test_leaky_store_never_returns_foreign_records() {
        let dir = tempdir().unwrap();
        let vectors = FakeIndex {
            leaky: true,
            ..Default::default()
        };
        let gov = governance(dir.path(), vectors, FakeModels::default()).await;
        add(&gov, "bob", "Bob's secrets", "The vault code is 1234.").await;

        let request = QueryRequest {
            top_k: Some(5),
            ..question("What is the vault code?")
        };
        let response = gov.query("alice", request).await.unwrap();
        assert!(response.sources.is_empty());
        assert_eq!(response.answer, NO_CONTEXT_ANSWER);
        assert_eq!(response.confidence, 0.0);
        assert_eq!(calls(&gov.models.complete_calls), 0);
    }

    #[tokio::test]
    async fn test_records_with_forged_tenant_are_dropped() {
        let dir = tempdir().unwrap();
        let gov = governance(dir.path(), FakeIndex::default(), FakeModels::default()).await;
        let partition = tenancy::resolve("alice").unwrap();
        gov.vectors
            .put(
                partition.as_str(),
                vec![VectorRecord {
                    metadata: VectorMetadata {
                        key: "forged#0".to_string(),
                        tenant_id: "al-ice".to_string(),
                        document_id: "forged".to_string(),
                        source_type: SOURCE_DOCUMENT.to_string(),
                        title: "Forged".to_string(),
                        text: "not yours".to_string(),
                        created_at: String::new(),
                    },
                    vector: vec![0.5; 4],
                }],
            )
            .await
            .unwrap();

        let response = gov.query("alice", question("anything?")).await.unwrap();
        assert!(response.sources.is_empty());
    }

    #[tokio::test]
    async fn test_scope_filters_source_type() {
        let dir = tempdir().unwrap();
        let gov = governance(dir.path(), FakeIndex::default(), FakeModels::default()).await;
        add(&gov, "alice", "Notes", "Some notes.").await;

        let request = QueryRequest {
            scope: QueryScope::Images,
            ..question("What is in my photos?")
        };
        let response = gov.query("alice", request).await.unwrap();
        assert!(response.sources.is_empty());
    }

    #[tokio::test]
    async fn test_query_limit_is_enforced() {
        let dir = tempdir().unwrap();
        let gov = governance(dir.path(), FakeIndex::default(), FakeModels::default()).await;
        gov.ledger()
            .record("alice", QuotaDimension::MonthlyQueries, 500.0)
            .await
            .unwrap();

        let err = gov.query("alice", question("hello?")).await.unwrap_err();
        assert!(matches!(err, GovernanceError::QuotaExceeded { .. }));
        assert_eq!(calls(&gov.models.embed_calls), 0);
    }

    #[tokio::test]
    async fn test_failed_completion_releases_query() {
        let dir = tempdir().unwrap();
        let models = FakeModels {
            fail_complete: true,
            ..Default::default()
        };
        let gov = governance(dir.path(), FakeIndex::default(), models).await;
        add(&gov, "alice", "Holidays", "Closed on Fridays.").await;

        let err = gov.query("alice", question("When?")).await.unwrap_err();
        assert!(matches!(err, GovernanceError::DependencyUnavailable(_)));
        assert_eq!(err.public_message(), "internal server error");
        assert_eq!(calls(&gov.models.complete_calls), 1);

        let status = gov.status("alice").await.unwrap();
        assert_eq!(status.current(QuotaDimension::MonthlyQueries), 0.0);
    }

    #[tokio::test]
    async fn test_empty_question_is_invalid() {
        let dir = tempdir().unwrap();
        let gov = governance(dir.path(), FakeIndex::default(), FakeModels::default()).await;

        let err = gov.query("alice", question(" ")).await.unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidRequest(_)));
    }
}
