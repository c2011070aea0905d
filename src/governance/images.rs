//! UploadImage, AnalyzeImage, image deletion and listing.

use serde::Serialize;
use tracing::{info, warn};

use super::{Governance, chunk_key, chunk_keys, refund, require};
use crate::indexer::{integrated_content, new_image_id, validate_image};
use crate::local::{
    ImageAnalysis, ImageRow, ListQuery, LocalStorage, Page, SOURCE_IMAGE, VectorIndex,
    VectorMetadata, VectorRecord, bytes_to_mb,
};
use crate::quota::Overage;
use crate::services::{Completer, ContentAnalyzer, Embedder, ImageInput};
use crate::tenancy::{self, Partition};
use crate::types::{GovernanceError, QuotaDimension, UsageDelta};

#[derive(Debug, Clone, Default)]
pub struct UploadImageRequest {
    /// Falls back to the filename when blank
    pub title: String,
    pub filename: String,
    pub bytes: Vec<u8>,
    pub tags: Vec<String>,
    /// Free text merged into the image's indexed knowledge
    pub context: Option<String>,
    /// Run OCR in addition to the description
    pub extract_text: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadImageResponse {
    pub image_id: String,
    pub title: String,
    pub size_mb: f64,
    pub vector_count: usize,
    pub description: String,
    pub ocr_text: String,
    pub labels: Vec<String>,
    pub confidence: f64,
    pub overages: Vec<Overage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeImageResponse {
    pub image_id: String,
    pub description: String,
    pub ocr_text: String,
    pub labels: Vec<String>,
    pub confidence: f64,
}

impl<V, M> Governance<V, M>
where
    V: VectorIndex,
    M: Embedder + Completer + ContentAnalyzer,
{
    /// Store, analyze and index an image.
    ///
    /// Consumes one image, its size in image storage, one monthly image
    /// analysis and one image vector per knowledge chunk. The exact vector
    /// count is unknown until the analysis is done, so admission reserves
    /// the chunks of the title and context alone and settles the rest.
    pub async fn upload_image(
        &self,
        tenant_id: &str,
        request: UploadImageRequest,
    ) -> Result<UploadImageResponse, GovernanceError> {
        require(&request.filename, "filename")?;
        let format = validate_image(&request.bytes)?;
        let partition = tenancy::resolve(tenant_id)?;

        let title = if request.title.trim().is_empty() {
            request.filename.clone()
        } else {
            request.title.trim().to_string()
        };
        let size_mb = bytes_to_mb(request.bytes.len());
        let charge = |vectors: f64| image_charge(size_mb, vectors);
        let known = integrated_content(&title, "", "", request.context.as_deref());
        let min_vectors = self.chunker.split(&known).len().max(1);
        let reservation = self
            .ledger
            .reserve(tenant_id, &charge(min_vectors as f64))
            .await?;

        let image_id = new_image_id();
        let storage_key = match self
            .storage
            .put(partition.as_str(), &image_id, &request.bytes)
            .await
        {
            Ok(key) => key,
            Err(e) => {
                return Err(self
                    .abort(reservation, GovernanceError::unavailable(e))
                    .await);
            }
        };

        let input = ImageInput {
            bytes: &request.bytes,
            mime_type: format.mime_type(),
        };
        let stored = async {
            let analysis = self.analyze(input, request.extract_text).await?;
            let vector_count = self
                .index_image(tenant_id, &partition, &image_id, &title, &analysis, &request)
                .await?;

            let row = ImageRow {
                id: image_id.clone(),
                tenant_id: tenant_id.to_string(),
                title: title.clone(),
                filename: request.filename.clone(),
                size_bytes: request.bytes.len() as i64,
                storage_key: storage_key.clone(),
                content_hash: LocalStorage::content_hash(&request.bytes),
                tags: json_array(&request.tags)?,
                ocr_text: analysis.ocr_text.clone(),
                description: analysis.description.clone(),
                labels: json_array(&analysis.labels)?,
                confidence: analysis.confidence,
                vector_count: vector_count as i64,
                created_at: self.now(),
                analyzed_at: Some(self.now()),
            };
            if let Err(e) = self.db.insert_image(&row).await {
                self.discard_vectors(&partition, &chunk_keys(&image_id, row.vector_count))
                    .await;
                return Err(e.into());
            }

            Ok::<_, GovernanceError>((analysis, vector_count))
        }
        .await;

        let (analysis, vector_count) = match stored {
            Ok(stored) => stored,
            Err(e) => {
                self.discard_blob(&storage_key).await;
                return Err(self.abort(reservation, e).await);
            }
        };

        let overages = self
            .ledger
            .settle(reservation, &charge(vector_count as f64))
            .await?;

        info!(
            tenant = tenant_id,
            image_id = %image_id,
            size_mb,
            vectors = vector_count,
            "Image uploaded"
        );

        Ok(UploadImageResponse {
            image_id,
            title,
            size_mb,
            vector_count,
            description: analysis.description,
            ocr_text: analysis.ocr_text,
            labels: analysis.labels,
            confidence: analysis.confidence,
            overages,
        })
    }

    /// Re-run OCR and description on a stored image. Consumes one monthly
    /// image analysis.
    pub async fn analyze_image(
        &self,
        tenant_id: &str,
        image_id: &str,
    ) -> Result<AnalyzeImageResponse, GovernanceError> {
        tenancy::resolve(tenant_id)?;
        let row = self.find_image(tenant_id, image_id).await?;

        let charge = [UsageDelta::one(QuotaDimension::MonthlyImageAnalyses)];
        let reservation = self.ledger.reserve(tenant_id, &charge).await?;

        let analyzed = async {
            let bytes = self
                .storage
                .get(&row.storage_key)
                .await
                .map_err(GovernanceError::unavailable)?;
            let format = validate_image(&bytes)?;
            let input = ImageInput {
                bytes: &bytes,
                mime_type: format.mime_type(),
            };
            let analysis = self.analyze(input, true).await?;
            self.db
                .update_image_analysis(tenant_id, &row.id, &analysis, &self.now())
                .await?;
            Ok::<_, GovernanceError>(analysis)
        }
        .await;

        let analysis = match analyzed {
            Ok(analysis) => analysis,
            Err(e) => return Err(self.abort(reservation, e).await),
        };
        self.ledger.settle(reservation, &charge).await?;

        info!(tenant = tenant_id, image_id, "Image analyzed");
        Ok(AnalyzeImageResponse {
            image_id: row.id,
            description: analysis.description,
            ocr_text: analysis.ocr_text,
            labels: analysis.labels,
            confidence: analysis.confidence,
        })
    }

    /// Remove an image with its blob and knowledge, giving back its usage.
    pub async fn delete_image(
        &self,
        tenant_id: &str,
        image_id: &str,
    ) -> Result<ImageRow, GovernanceError> {
        let partition = tenancy::resolve(tenant_id)?;
        let row = self.find_image(tenant_id, image_id).await?;

        self.vectors
            .delete(partition.as_str(), &chunk_keys(&row.id, row.vector_count))
            .await
            .map_err(GovernanceError::unavailable)?;
        self.storage
            .delete(&row.storage_key)
            .await
            .map_err(GovernanceError::unavailable)?;
        self.db.delete_image(tenant_id, &row.id).await?;

        let charge = image_charge(row.size_mb(), row.vector_count as f64);
        self.ledger.record_all(tenant_id, &refund(&charge)).await?;

        info!(tenant = tenant_id, image_id, "Image deleted");
        Ok(row)
    }

    pub async fn list_images(
        &self,
        tenant_id: &str,
        query: &ListQuery,
    ) -> Result<Page<ImageRow>, GovernanceError> {
        tenancy::resolve(tenant_id)?;
        Ok(self.db.list_images(tenant_id, query).await?)
    }

    async fn find_image(&self, tenant_id: &str, image_id: &str) -> Result<ImageRow, GovernanceError> {
        self.db
            .get_image(tenant_id, image_id)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(format!("image {}", image_id)))
    }

    /// Vision description, plus OCR when asked for. The confidence is the
    /// mean over the analyses that ran.
    async fn analyze(
        &self,
        input: ImageInput<'_>,
        extract_text: bool,
    ) -> Result<ImageAnalysis, GovernanceError> {
        let ocr = if extract_text {
            Some(
                self.invoker
                    .invoke(|| self.models.extract_text(input))
                    .await?,
            )
        } else {
            None
        };
        let description = self
            .invoker
            .invoke(|| self.models.describe_image(input))
            .await?;

        let confidence = match &ocr {
            Some(ocr) => (ocr.confidence + description.confidence) / 2.0,
            None => description.confidence,
        };

        Ok(ImageAnalysis {
            ocr_text: ocr.map(|o| o.text).unwrap_or_default(),
            description: description.description,
            labels: description.labels,
            confidence,
        })
    }

    /// Chunk and embed everything known about an image into the tenant's
    /// partition. Returns the number of vectors written.
    async fn index_image(
        &self,
        tenant_id: &str,
        partition: &Partition,
        image_id: &str,
        title: &str,
        analysis: &ImageAnalysis,
        request: &UploadImageRequest,
    ) -> Result<usize, GovernanceError> {
        let content = integrated_content(
            title,
            &analysis.description,
            &analysis.ocr_text,
            request.context.as_deref(),
        );
        let chunks = self.chunker.split(&content);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embed(&texts).await?;

        let created_at = self.now();
        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, vector)| VectorRecord {
                metadata: VectorMetadata {
                    key: chunk_key(image_id, chunk.index),
                    tenant_id: tenant_id.to_string(),
                    document_id: image_id.to_string(),
                    source_type: SOURCE_IMAGE.to_string(),
                    title: title.to_string(),
                    text: chunk.text,
                    created_at: created_at.clone(),
                },
                vector,
            })
            .collect();
        let vector_count = records.len();

        self.vectors
            .put(partition.as_str(), records)
            .await
            .map_err(GovernanceError::unavailable)?;
        Ok(vector_count)
    }

    async fn discard_blob(&self, key: &str) {
        if let Err(e) = self.storage.delete(key).await {
            warn!(key, error = %e, "Failed to discard image blob");
        }
    }
}

fn image_charge(size_mb: f64, vectors: f64) -> Vec<UsageDelta> {
    vec![
        UsageDelta::one(QuotaDimension::Images),
        UsageDelta::new(QuotaDimension::ImageStorageMb, size_mb),
        UsageDelta::new(QuotaDimension::ImageVectors, vectors),
        UsageDelta::one(QuotaDimension::MonthlyImageAnalyses),
    ]
}

fn json_array(values: &[String]) -> Result<String, GovernanceError> {
    serde_json::to_string(values)
        .map_err(|e| GovernanceError::InvalidRequest(format!("cannot encode list: {}", e)))
}
