//! AddDocument, document deletion and listing.

use serde::Serialize;
use tracing::info;

use super::{Governance, chunk_key, chunk_keys, refund, require};
use crate::indexer::{document_size_mb, estimate_vector_count};
use crate::local::{
    DocumentRow, ListQuery, Page, SOURCE_DOCUMENT, VectorIndex, VectorMetadata, VectorRecord,
};
use crate::quota::Overage;
use crate::services::{Completer, ContentAnalyzer, Embedder};
use crate::tenancy::{self, Partition};
use crate::types::{GovernanceError, QuotaDimension, UsageDelta};

#[derive(Debug, Clone)]
pub struct AddDocumentRequest {
    pub title: String,
    pub text: String,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddDocumentResponse {
    pub document_id: String,
    pub title: String,
    pub vector_count: usize,
    pub size_mb: f64,
    /// Dimensions the actual usage pushed over their limit
    pub overages: Vec<Overage>,
}

impl<V, M> Governance<V, M>
where
    V: VectorIndex,
    M: Embedder + Completer + ContentAnalyzer,
{
    /// Chunk, embed and index a document.
    ///
    /// Consumes one document, one daily upload, the document's size and one
    /// vector per chunk. Admission uses an estimate of the vector count;
    /// the real count is charged afterwards.
    pub async fn add_document(
        &self,
        tenant_id: &str,
        request: AddDocumentRequest,
    ) -> Result<AddDocumentResponse, GovernanceError> {
        require(&request.title, "title")?;
        require(&request.text, "text")?;
        let partition = tenancy::resolve(tenant_id)?;

        let size_mb = document_size_mb(&request.text);
        let estimated = estimate_vector_count(&request.text);
        let charge = |vectors: f64| document_charge(vectors, size_mb);

        let reservation = self
            .ledger
            .reserve(tenant_id, &charge(estimated as f64))
            .await?;

        let document_id = uuid::Uuid::new_v4().to_string();
        let vector_count = match self
            .index_document(tenant_id, &partition, &document_id, &request, size_mb)
            .await
        {
            Ok(count) => count,
            Err(e) => return Err(self.abort(reservation, e).await),
        };

        let overages = self
            .ledger
            .settle(reservation, &charge(vector_count as f64))
            .await?;

        info!(
            tenant = tenant_id,
            document_id = %document_id,
            vectors = vector_count,
            estimated,
            "Document added"
        );

        Ok(AddDocumentResponse {
            document_id,
            title: request.title,
            vector_count,
            size_mb,
            overages,
        })
    }

    async fn index_document(
        &self,
        tenant_id: &str,
        partition: &Partition,
        document_id: &str,
        request: &AddDocumentRequest,
        size_mb: f64,
    ) -> Result<usize, GovernanceError> {
        let chunks = self.chunker.split(&request.text);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embed(&texts).await?;

        let created_at = self.now();
        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, vector)| VectorRecord {
                metadata: VectorMetadata {
                    key: chunk_key(document_id, chunk.index),
                    tenant_id: tenant_id.to_string(),
                    document_id: document_id.to_string(),
                    source_type: SOURCE_DOCUMENT.to_string(),
                    title: request.title.clone(),
                    text: chunk.text,
                    created_at: created_at.clone(),
                },
                vector,
            })
            .collect();
        let keys: Vec<String> = records.iter().map(|r| r.metadata.key.clone()).collect();
        let vector_count = records.len();

        self.vectors
            .put(partition.as_str(), records)
            .await
            .map_err(GovernanceError::unavailable)?;

        let row = DocumentRow {
            id: document_id.to_string(),
            tenant_id: tenant_id.to_string(),
            title: request.title.clone(),
            filename: request.filename.clone(),
            vector_count: vector_count as i64,
            size_mb,
            content_length: request.text.chars().count() as i64,
            created_at,
        };
        if let Err(e) = self.db.insert_document(&row).await {
            self.discard_vectors(partition, &keys).await;
            return Err(e.into());
        }

        Ok(vector_count)
    }

    /// Remove a document and its vectors, giving back its usage.
    pub async fn delete_document(
        &self,
        tenant_id: &str,
        document_id: &str,
    ) -> Result<DocumentRow, GovernanceError> {
        let partition = tenancy::resolve(tenant_id)?;
        let row = self
            .db
            .get_document(tenant_id, document_id)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(format!("document {}", document_id)))?;

        self.vectors
            .delete(partition.as_str(), &chunk_keys(&row.id, row.vector_count))
            .await
            .map_err(GovernanceError::unavailable)?;
        self.db.delete_document(tenant_id, &row.id).await?;

        let charge = document_charge(row.vector_count as f64, row.size_mb);
        self.ledger.record_all(tenant_id, &refund(&charge)).await?;

        info!(tenant = tenant_id, document_id, "Document deleted");
        Ok(row)
    }

    pub async fn list_documents(
        &self,
        tenant_id: &str,
        query: &ListQuery,
    ) -> Result<Page<DocumentRow>, GovernanceError> {
        tenancy::resolve(tenant_id)?;
        Ok(self.db.list_documents(tenant_id, query).await?)
    }
}

fn document_charge(vectors: f64, size_mb: f64) -> Vec<UsageDelta> {
    vec![
        UsageDelta::one(QuotaDimension::Documents),
        UsageDelta::new(QuotaDimension::Vectors, vectors),
        UsageDelta::new(QuotaDimension::StorageMb, size_mb),
        UsageDelta::one(QuotaDimension::DailyUploads),
    ]
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    fn request(text: &str) -> AddDocumentRequest {
        AddDocumentRequest {
            title: "Handbook".to_string(),
            text: text.to_string(),
            filename: Some("handbook.txt".to_string()),
        }
    }

    #[tokio::test]
    async fn test_add_document_records_actual_usage() {
        let dir = tempdir().unwrap();
        let gov = governance(dir.path(), FakeIndex::default(), FakeModels::default()).await;

        let text = "x".repeat(2500);
        let response = gov.add_document("alice", request(&text)).await.unwrap();
        assert_eq!(response.vector_count, 3);
        assert!(response.overages.is_empty());

        let status = gov.status("alice").await.unwrap();
        assert_eq!(status.current(QuotaDimension::Documents), 1.0);
        assert_eq!(status.current(QuotaDimension::Vectors), 3.0);
        assert_eq!(status.current(QuotaDimension::DailyUploads), 1.0);
        assert!(status.current(QuotaDimension::StorageMb) > 0.0);

        let page = gov.list_documents("alice", &ListQuery::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].vector_count, 3);
        assert_eq!(page.items[0].content_length, 2500);
        assert_eq!(gov.knowledge("alice").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_denied_document_never_calls_embedder() {
        let dir = tempdir().unwrap();
        let gov = governance(dir.path(), FakeIndex::default(), FakeModels::default()).await;
        gov.ledger()
            .record("alice", QuotaDimension::Documents, 50.0)
            .await
            .unwrap();
        let before = gov.status("alice").await.unwrap();

        let err = gov.add_document("alice", request("hello")).await.unwrap_err();
        match &err {
            GovernanceError::QuotaExceeded { reason, status } => {
                assert_eq!(reason, "Document limit exceeded (51/50)");
                assert_eq!(status.current(QuotaDimension::Documents), 50.0);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.public_message(), "quota exceeded: Document limit exceeded (51/50)");
        assert_eq!(calls(&gov.models.embed_calls), 0);
        assert_eq!(gov.status("alice").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_invalid_tenant_writes_no_usage() {
        let dir = tempdir().unwrap();
        let gov = governance(dir.path(), FakeIndex::default(), FakeModels::default()).await;

        let err = gov.add_document("@@@", request("hello")).await.unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidTenant(_)));
        assert!(gov.db.get_usage("@@@").await.unwrap().is_none());
        assert_eq!(calls(&gov.models.embed_calls), 0);
    }

    #[tokio::test]
    async fn test_empty_text_is_invalid() {
        let dir = tempdir().unwrap();
        let gov = governance(dir.path(), FakeIndex::default(), FakeModels::default()).await;

        let err = gov.add_document("alice", request("   ")).await.unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_throttled_embedding_is_retried() {
        let dir = tempdir().unwrap();
        let models = FakeModels::default();
        models.throttled_embeds.store(2, Ordering::SeqCst);
        let gov = governance(dir.path(), FakeIndex::default(), models).await;

        gov.add_document("alice", request("hello world")).await.unwrap();
        assert_eq!(calls(&gov.models.embed_calls), 3);
    }

    #[tokio::test]
    async fn test_failed_indexing_charges_nothing() {
        let dir = tempdir().unwrap();
        let models = FakeModels::default();
        models.throttled_embeds.store(10, Ordering::SeqCst);
        let gov = governance(dir.path(), FakeIndex::default(), models).await;

        let err = gov.add_document("alice", request("hello")).await.unwrap_err();
        assert!(matches!(err, GovernanceError::Throttled(_)));
        assert_eq!(err.public_message(), "internal server error");
        assert_eq!(calls(&gov.models.embed_calls), 4);

        let status = gov.status("alice").await.unwrap();
        assert!(status.dimensions.iter().all(|d| d.current == 0.0));
    }

    #[tokio::test]
    async fn test_failed_vector_write_charges_nothing() {
        let dir = tempdir().unwrap();
        let vectors = FakeIndex {
            fail_put: true,
            ..Default::default()
        };
        let gov = governance(dir.path(), vectors, FakeModels::default()).await;

        let err = gov.add_document("alice", request("hello")).await.unwrap_err();
        assert!(matches!(err, GovernanceError::DependencyUnavailable(_)));
        let status = gov.status("alice").await.unwrap();
        assert_eq!(status.current(QuotaDimension::Documents), 0.0);
        assert_eq!(status.current(QuotaDimension::DailyUploads), 0.0);
    }

    #[tokio::test]
    async fn test_delete_document_gives_usage_back() {
        let dir = tempdir().unwrap();
        let gov = governance(dir.path(), FakeIndex::default(), FakeModels::default()).await;

        let added = gov
            .add_document("alice", request(&"y".repeat(1500)))
            .await
            .unwrap();
        gov.delete_document("alice", &added.document_id).await.unwrap();

        let status = gov.status("alice").await.unwrap();
        assert_eq!(status.current(QuotaDimension::Documents), 0.0);
        assert_eq!(status.current(QuotaDimension::Vectors), 0.0);
        assert!(status.current(QuotaDimension::StorageMb).abs() < 1e-12);
        // Daily uploads are not given back.
        assert_eq!(status.current(QuotaDimension::DailyUploads), 1.0);
        assert!(gov.knowledge("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cannot_delete_another_tenants_document() {
        let dir = tempdir().unwrap();
        let gov = governance(dir.path(), FakeIndex::default(), FakeModels::default()).await;

        let added = gov.add_document("alice", request("secret")).await.unwrap();
        let err = gov
            .delete_document("bob", &added.document_id)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::NotFound(_)));
        assert_eq!(gov.knowledge("alice").await.unwrap().len(), 1);
    }
}
