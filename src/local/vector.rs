//! LanceDB vector storage for similarity search.
//!
//! Every partition is its own table. Rows carry the owning tenant id so
//! readers can verify ownership of whatever comes back.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, Table};

use super::models::{VECTOR_DIM, VectorMetadata, VectorRecord, VectorSearchHit};

/// Partitioned similarity index.
///
/// Partition ids are opaque to the index; callers derive them.
pub trait VectorIndex: Send + Sync {
    /// Insert records into a partition, creating it on first use.
    fn put(
        &self,
        partition: &str,
        records: Vec<VectorRecord>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Nearest neighbours in a partition, closest first.
    ///
    /// `source_type` restricts hits to one kind of source. A partition that
    /// does not exist yet has no hits.
    fn query(
        &self,
        partition: &str,
        vector: &[f32],
        top_k: usize,
        source_type: Option<&str>,
    ) -> impl Future<Output = Result<Vec<VectorSearchHit>>> + Send;

    /// Remove records by key.
    fn delete(&self, partition: &str, keys: &[String]) -> impl Future<Output = Result<()>> + Send;

    /// Metadata of every record in a partition.
    fn list(&self, partition: &str) -> impl Future<Output = Result<Vec<VectorMetadata>>> + Send;
}

/// LanceDB-based vector store.
pub struct VectorStore {
    db: Connection,
}

impl VectorStore {
    /// Open or create a vector store at the given path.
    pub async fn open(path: &Path) -> Result<Self> {
        let uri = path
            .to_str()
            .context("Vector store path is not valid UTF-8")?;
        let db = lancedb::connect(uri)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self { db })
    }

    /// Get or create the table of a partition.
    async fn get_or_create_table(&self, partition: &str) -> Result<Table> {
        if let Ok(table) = self.db.open_table(partition).execute().await {
            return Ok(table);
        }

        let schema = Self::schema();
        let empty_batch = Self::records_to_batch(&[])?;
        let batches = RecordBatchIterator::new(vec![Ok(empty_batch)], schema);

        let table = self
            .db
            .create_table(partition, Box::new(batches))
            .execute()
            .await
            .with_context(|| format!("Failed to create table '{}'", partition))?;

        Ok(table)
    }

    async fn open_existing(&self, partition: &str) -> Option<Table> {
        self.db.open_table(partition).execute().await.ok()
    }

    fn schema() -> Arc<Schema> {
        let text = |name: &str| Field::new(name, DataType::Utf8, false);
        Arc::new(Schema::new(vec![
            text("key"),
            text("tenant_id"),
            text("document_id"),
            text("source_type"),
            text("title"),
            text("text"),
            text("created_at"),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    VECTOR_DIM,
                ),
                false,
            ),
        ]))
    }

    fn records_to_batch(records: &[VectorRecord]) -> Result<RecordBatch> {
        let column = |get: fn(&VectorMetadata) -> &str| -> Arc<dyn Array> {
            Arc::new(StringArray::from(
                records.iter().map(|r| get(&r.metadata)).collect::<Vec<_>>(),
            ))
        };

        if let Some(bad) = records.iter().find(|r| r.vector.len() != VECTOR_DIM as usize) {
            anyhow::bail!(
                "Vector for '{}' has {} dimensions, expected {}",
                bad.metadata.key,
                bad.vector.len(),
                VECTOR_DIM
            );
        }

        let flat_vectors: Vec<f32> = records
            .iter()
            .flat_map(|r| r.vector.iter().copied())
            .collect();
        let vector_array = FixedSizeListArray::new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            VECTOR_DIM,
            Arc::new(Float32Array::from(flat_vectors)),
            None,
        );

        RecordBatch::try_new(
            Self::schema(),
            vec![
                column(|m| m.key.as_str()),
                column(|m| m.tenant_id.as_str()),
                column(|m| m.document_id.as_str()),
                column(|m| m.source_type.as_str()),
                column(|m| m.title.as_str()),
                column(|m| m.text.as_str()),
                column(|m| m.created_at.as_str()),
                Arc::new(vector_array),
            ],
        )
        .context("Failed to create record batch")
    }

    fn batch_to_metadata(batch: &RecordBatch) -> Result<Vec<VectorMetadata>> {
        let keys = string_column(batch, "key")?;
        let tenants = string_column(batch, "tenant_id")?;
        let documents = string_column(batch, "document_id")?;
        let sources = string_column(batch, "source_type")?;
        let titles = string_column(batch, "title")?;
        let texts = string_column(batch, "text")?;
        let created = string_column(batch, "created_at")?;

        Ok((0..batch.num_rows())
            .map(|i| VectorMetadata {
                key: keys.value(i).to_string(),
                tenant_id: tenants.value(i).to_string(),
                document_id: documents.value(i).to_string(),
                source_type: sources.value(i).to_string(),
                title: titles.value(i).to_string(),
                text: texts.value(i).to_string(),
                created_at: created.value(i).to_string(),
            })
            .collect())
    }

    fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<VectorSearchHit>> {
        let distances = batch
            .column_by_name("_distance")
            .context("Missing _distance column")?
            .as_any()
            .downcast_ref::<Float32Array>()
            .context("Invalid _distance type")?;

        Ok(Self::batch_to_metadata(batch)?
            .into_iter()
            .enumerate()
            .map(|(i, metadata)| VectorSearchHit {
                metadata,
                distance: distances.value(i),
            })
            .collect())
    }
}

impl VectorIndex for VectorStore {
    async fn put(&self, partition: &str, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let table = self.get_or_create_table(partition).await?;
        let batch = Self::records_to_batch(&records)?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], Self::schema());

        table
            .add(Box::new(batches))
            .execute()
            .await
            .context("Failed to insert vectors")?;

        Ok(())
    }

    async fn query(
        &self,
        partition: &str,
        vector: &[f32],
        top_k: usize,
        source_type: Option<&str>,
    ) -> Result<Vec<VectorSearchHit>> {
        let Some(table) = self.open_existing(partition).await else {
            return Ok(vec![]);
        };

        let mut query = table
            .query()
            .nearest_to(vector)
            .context("Invalid query vector")?
            .limit(top_k);
        if let Some(source_type) = source_type {
            query = query.only_if(format!("source_type = {}", sql_literal(source_type)));
        }

        let results = query
            .execute()
            .await
            .context("Failed to execute search")?
            .try_collect::<Vec<_>>()
            .await
            .context("Failed to collect results")?;

        let mut hits = Vec::new();
        for batch in results {
            hits.extend(Self::batch_to_hits(&batch)?);
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(top_k);

        Ok(hits)
    }

    async fn delete(&self, partition: &str, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let Some(table) = self.open_existing(partition).await else {
            return Ok(());
        };

        let list: Vec<String> = keys.iter().map(|k| sql_literal(k)).collect();
        table
            .delete(&format!("key IN ({})", list.join(", ")))
            .await
            .context("Failed to delete vectors")?;

        Ok(())
    }

    async fn list(&self, partition: &str) -> Result<Vec<VectorMetadata>> {
        let Some(table) = self.open_existing(partition).await else {
            return Ok(vec![]);
        };

        let count = table
            .count_rows(None)
            .await
            .context("Failed to count vectors")?;
        if count == 0 {
            return Ok(vec![]);
        }

        let results = table
            .query()
            .limit(count)
            .execute()
            .await
            .context("Failed to scan vectors")?
            .try_collect::<Vec<_>>()
            .await
            .context("Failed to collect rows")?;

        let mut rows = Vec::new();
        for batch in results {
            rows.extend(Self::batch_to_metadata(&batch)?);
        }

        Ok(rows)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .with_context(|| format!("Missing {} column", name))?
        .as_any()
        .downcast_ref::<StringArray>()
        .with_context(|| format!("Invalid {} type", name))
}

/// Quote a string for a Lance SQL predicate.
fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::models::{SOURCE_DOCUMENT, SOURCE_IMAGE};
    use tempfile::tempdir;

    fn record(key: &str, source_type: &str, fill: f32) -> VectorRecord {
        VectorRecord {
            metadata: VectorMetadata {
                key: key.to_string(),
                tenant_id: "alice".to_string(),
                document_id: format!("doc-{key}"),
                source_type: source_type.to_string(),
                title: format!("Title {key}"),
                text: format!("text of {key}"),
                created_at: "2024-01-01T00:00:00+00:00".to_string(),
            },
            vector: vec![fill; VECTOR_DIM as usize],
        }
    }

    #[tokio::test]
    async fn test_put_and_query() {
        let dir = tempdir().unwrap();
        let store = VectorStore::open(dir.path()).await.unwrap();

        let records = vec![
            record("chunk1", SOURCE_DOCUMENT, 1.0),
            record("chunk2", SOURCE_DOCUMENT, 0.0),
        ];
        store.put("tenant-alice-store", records).await.unwrap();

        let query = vec![1.0; VECTOR_DIM as usize];
        let results = store
            .query("tenant-alice-store", &query, 10, None)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].metadata.key, "chunk1");
        assert_eq!(results[0].metadata.tenant_id, "alice");
        assert_eq!(results[0].metadata.title, "Title chunk1");
    }

    #[tokio::test]
    async fn test_query_missing_partition_is_empty() {
        let dir = tempdir().unwrap();
        let store = VectorStore::open(dir.path()).await.unwrap();

        let query = vec![1.0; VECTOR_DIM as usize];
        let results = store
            .query("tenant-nobody-store", &query, 3, None)
            .await
            .unwrap();
        assert!(results.is_empty());
        assert!(store.list("tenant-nobody-store").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_by_source_type() {
        let dir = tempdir().unwrap();
        let store = VectorStore::open(dir.path()).await.unwrap();

        store
            .put(
                "tenant-alice-store",
                vec![
                    record("doc", SOURCE_DOCUMENT, 1.0),
                    record("img", SOURCE_IMAGE, 0.5),
                ],
            )
            .await
            .unwrap();

        let query = vec![1.0; VECTOR_DIM as usize];
        let results = store
            .query("tenant-alice-store", &query, 10, Some(SOURCE_IMAGE))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata.key, "img");
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let dir = tempdir().unwrap();
        let store = VectorStore::open(dir.path()).await.unwrap();

        store
            .put(
                "tenant-alice-store",
                vec![
                    record("keep", SOURCE_DOCUMENT, 1.0),
                    record("it's-gone", SOURCE_DOCUMENT, 0.0),
                ],
            )
            .await
            .unwrap();

        store
            .delete("tenant-alice-store", &["it's-gone".to_string()])
            .await
            .unwrap();

        let rows = store.list("tenant-alice-store").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "keep");
    }

    #[test]
    fn test_sql_literal_escapes_quotes() {
        assert_eq!(sql_literal("it's"), "'it''s'");
    }
}
