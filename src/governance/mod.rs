//! Governance facade: quota admission, tenant isolation and resilient
//! downstream calls around every resource-consuming operation.
//!
//! Each guarded operation follows the same sequence:
//! 1. Validate the request and resolve the tenant's partition
//! 2. Reserve every consumed dimension atomically (denial short-circuits
//!    before any downstream call)
//! 3. Perform the downstream calls through the `ResilientInvoker`
//! 4. Settle the reservation with the observed amounts, or release it if
//!    anything failed

mod documents;
mod images;
mod query;

pub use documents::AddDocumentRequest;
pub use images::UploadImageRequest;
pub use query::{QueryRequest, QueryScope};

use tracing::{error, warn};

use crate::indexer::TextChunker;
use crate::local::{LocalDb, LocalStorage, VectorIndex, VectorMetadata};
use crate::quota::{QuotaLedger, Reservation};
use crate::retry::ResilientInvoker;
use crate::services::{Completer, ContentAnalyzer, Embedder};
use crate::tenancy::{self, Partition};
use crate::types::{GovernanceError, Plan, QuotaStatus, UsageDelta};

/// Default number of chunks retrieved per query.
pub const DEFAULT_TOP_K: usize = 3;

/// Entry point for every tenant-facing operation.
pub struct Governance<V, M> {
    ledger: QuotaLedger,
    db: LocalDb,
    storage: LocalStorage,
    vectors: V,
    models: M,
    invoker: ResilientInvoker,
    chunker: TextChunker,
    default_top_k: usize,
}

impl<V, M> Governance<V, M>
where
    V: VectorIndex,
    M: Embedder + Completer + ContentAnalyzer,
{
    pub fn new(
        ledger: QuotaLedger,
        db: LocalDb,
        storage: LocalStorage,
        vectors: V,
        models: M,
    ) -> Self {
        Self {
            ledger,
            db,
            storage,
            vectors,
            models,
            invoker: ResilientInvoker::default(),
            chunker: TextChunker::default(),
            default_top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_invoker(mut self, invoker: ResilientInvoker) -> Self {
        self.invoker = invoker;
        self
    }

    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k.max(1);
        self
    }

    #[cfg(test)]
    pub fn ledger(&self) -> &QuotaLedger {
        &self.ledger
    }

    /// Quota snapshot of a tenant.
    pub async fn status(&self, tenant_id: &str) -> Result<QuotaStatus, GovernanceError> {
        tenancy::resolve(tenant_id)?;
        self.ledger.status(tenant_id).await
    }

    /// Move a tenant to another plan. Usage is left as is.
    pub async fn set_plan(&self, tenant_id: &str, plan_name: &str) -> Result<Plan, GovernanceError> {
        tenancy::resolve(tenant_id)?;
        self.ledger.set_plan(tenant_id, plan_name).await
    }

    /// Every indexed chunk the tenant owns.
    pub async fn knowledge(&self, tenant_id: &str) -> Result<Vec<VectorMetadata>, GovernanceError> {
        let partition = tenancy::resolve(tenant_id)?;
        let rows = self
            .vectors
            .list(partition.as_str())
            .await
            .map_err(GovernanceError::unavailable)?;
        Ok(tenancy::filter_owned(rows, tenant_id))
    }

    /// Embed texts through the invoker, one vector per text.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GovernanceError> {
        let vectors = self.invoker.invoke(|| self.models.embed(texts)).await?;
        if vectors.len() != texts.len() {
            return Err(GovernanceError::DependencyUnavailable(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    /// Give back a reservation after a failed operation and pass the
    /// failure on.
    async fn abort(&self, reservation: Reservation, err: GovernanceError) -> GovernanceError {
        warn!(
            tenant = reservation.tenant_id(),
            error = %err,
            "Operation failed, releasing reservation"
        );
        if let Err(release_err) = self.ledger.release(reservation).await {
            error!(error = %release_err, "Failed to release reservation");
        }
        err
    }

    /// Best-effort removal of vectors written by a failed operation.
    async fn discard_vectors(&self, partition: &Partition, keys: &[String]) {
        if let Err(e) = self.vectors.delete(partition.as_str(), keys).await {
            warn!(partition = %partition, error = %e, "Failed to discard vectors");
        }
    }

    fn now(&self) -> String {
        self.ledger.window().now().to_rfc3339()
    }
}

/// Vector key of the `index`-th chunk of a document or image.
fn chunk_key(source_id: &str, index: usize) -> String {
    format!("{}#{}", source_id, index)
}

fn chunk_keys(source_id: &str, count: i64) -> Vec<String> {
    (0..count.max(0) as usize)
        .map(|i| chunk_key(source_id, i))
        .collect()
}

/// What a deletion gives back: cumulative dimensions only, periodic
/// counters keep what was consumed.
fn refund(charge: &[UsageDelta]) -> Vec<UsageDelta> {
    charge
        .iter()
        .filter(|d| !d.dimension.is_periodic())
        .map(UsageDelta::negated)
        .collect()
}

fn require(value: &str, field: &str) -> Result<(), GovernanceError> {
    if value.trim().is_empty() {
        return Err(GovernanceError::InvalidRequest(format!(
            "{} must not be empty",
            field
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory stand-ins for the vector store and the model services.

    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::local::{VectorRecord, VectorSearchHit};
    use crate::quota::{MockClock, PlanCatalog, UsageWindow};
    use crate::retry::RetryPolicy;
    use crate::services::{
        Completion, ImageDescription, ImageInput, ServiceError, TextExtraction,
    };

    /// Vector index kept in memory. With `leaky` set, every query returns
    /// records of all partitions, like a mis-scoped store would.
    #[derive(Default)]
    pub struct FakeIndex {
        pub partitions: Mutex<HashMap<String, Vec<VectorRecord>>>,
        pub leaky: bool,
        pub fail_put: bool,
    }

    impl VectorIndex for FakeIndex {
        async fn put(&self, partition: &str, records: Vec<VectorRecord>) -> anyhow::Result<()> {
            if self.fail_put {
                anyhow::bail!("disk full");
            }
            let mut partitions = self.partitions.lock().unwrap();
            partitions
                .entry(partition.to_string())
                .or_default()
                .extend(records);
            Ok(())
        }

        async fn query(
            &self,
            partition: &str,
            _vector: &[f32],
            top_k: usize,
            source_type: Option<&str>,
        ) -> anyhow::Result<Vec<VectorSearchHit>> {
            let partitions = self.partitions.lock().unwrap();
            let records: Vec<&VectorRecord> = if self.leaky {
                partitions.values().flatten().collect()
            } else {
                partitions.get(partition).into_iter().flatten().collect()
            };

            Ok(records
                .into_iter()
                .filter(|r| source_type.is_none_or(|s| r.metadata.source_type == s))
                .take(top_k)
                .enumerate()
                .map(|(i, r)| VectorSearchHit {
                    metadata: r.metadata.clone(),
                    distance: i as f32,
                })
                .collect())
        }

        async fn delete(&self, partition: &str, keys: &[String]) -> anyhow::Result<()> {
            let mut partitions = self.partitions.lock().unwrap();
            if let Some(records) = partitions.get_mut(partition) {
                records.retain(|r| !keys.contains(&r.metadata.key));
            }
            Ok(())
        }

        async fn list(&self, partition: &str) -> anyhow::Result<Vec<VectorMetadata>> {
            let partitions = self.partitions.lock().unwrap();
            Ok(partitions
                .get(partition)
                .map(|records| records.iter().map(|r| r.metadata.clone()).collect())
                .unwrap_or_default())
        }
    }

    /// Model services with call counters and scripted failures.
    #[derive(Default)]
    pub struct FakeModels {
        pub embed_calls: AtomicU32,
        pub complete_calls: AtomicU32,
        pub ocr_calls: AtomicU32,
        pub describe_calls: AtomicU32,
        /// Embedding calls that answer "throttled" before succeeding
        pub throttled_embeds: AtomicU32,
        pub fail_complete: bool,
        pub last_prompt: Mutex<Option<Completion>>,
    }

    impl Embedder for FakeModels {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
            self.embed_calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.throttled_embeds.load(Ordering::SeqCst);
            if remaining > 0 {
                self.throttled_embeds.store(remaining - 1, Ordering::SeqCst);
                return Err(ServiceError::Throttled("429".to_string()));
            }
            Ok(texts.iter().map(|_| vec![0.5; 4]).collect())
        }
    }

    impl Completer for FakeModels {
        async fn complete(&self, request: &Completion) -> Result<String, ServiceError> {
            self.complete_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(request.clone());
            if self.fail_complete {
                return Err(ServiceError::Unavailable("503".to_string()));
            }
            Ok("Answer from context".to_string())
        }
    }

    impl ContentAnalyzer for FakeModels {
        async fn extract_text(&self, _image: ImageInput<'_>) -> Result<TextExtraction, ServiceError> {
            self.ocr_calls.fetch_add(1, Ordering::SeqCst);
            Ok(TextExtraction {
                text: "OPEN 9-5".to_string(),
                confidence: 0.9,
            })
        }

        async fn describe_image(
            &self,
            _image: ImageInput<'_>,
        ) -> Result<ImageDescription, ServiceError> {
            self.describe_calls.fetch_add(1, Ordering::SeqCst);
            Ok(ImageDescription {
                description: "A shop sign on a door".to_string(),
                labels: vec!["sign".to_string(), "door".to_string()],
                confidence: 0.8,
            })
        }
    }

    pub type TestGovernance = Governance<FakeIndex, FakeModels>;

    pub async fn governance(dir: &Path, vectors: FakeIndex, models: FakeModels) -> TestGovernance {
        let mut clock = MockClock::new();
        clock
            .expect_now()
            .return_const(Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap());

        let db = LocalDb::open(&dir.join("ledger.sqlite")).await.unwrap();
        let ledger = QuotaLedger::new(
            db.clone(),
            Arc::new(PlanCatalog::builtin()),
            UsageWindow::new(Arc::new(clock)),
        );
        let storage = LocalStorage::new(dir.join("blobs")).await.unwrap();
        let invoker = ResilientInvoker::new(
            RetryPolicy::new(3)
                .with_base_delay(Duration::ZERO)
                .with_max_jitter(Duration::from_millis(1)),
        );

        Governance::new(ledger, db, storage, vectors, models).with_invoker(invoker)
    }

    pub fn calls(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}
