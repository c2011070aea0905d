//! Data models for local storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::{Limits, Plan, PlanTier};

// ============================================================================
// Plan Models
// ============================================================================

/// A row of the plan table: the tier reference plus the limits in force.
#[derive(Debug, Clone, FromRow)]
pub struct PlanRow {
    pub tenant_id: String,
    pub plan_type: String,
    pub documents: i64,
    pub vectors: i64,
    pub storage_mb: i64,
    pub monthly_queries: i64,
    pub daily_uploads: i64,
    pub images: i64,
    pub image_storage_mb: i64,
    pub image_vectors: i64,
    pub monthly_image_analyses: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl PlanRow {
    /// Convert to a `Plan`. A stored tier name that no longer parses falls
    /// back to free; the stored limits still apply.
    pub fn into_plan(self) -> Plan {
        let tier = self.plan_type.parse().unwrap_or(PlanTier::Free);
        let limits = Limits {
            documents: self.documents.max(0) as u64,
            vectors: self.vectors.max(0) as u64,
            storage_mb: self.storage_mb.max(0) as u64,
            monthly_queries: self.monthly_queries.max(0) as u64,
            daily_uploads: self.daily_uploads.max(0) as u64,
            images: self.images.max(0) as u64,
            image_storage_mb: self.image_storage_mb.max(0) as u64,
            image_vectors: self.image_vectors.max(0) as u64,
            monthly_image_analyses: self.monthly_image_analyses.max(0) as u64,
        };
        Plan {
            tier,
            limits,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        }
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

// ============================================================================
// Document Models
// ============================================================================

/// A document registered in a tenant's knowledge base.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DocumentRow {
    pub id: String,
    pub tenant_id: String,
    pub title: String,
    pub filename: Option<String>,
    pub vector_count: i64,
    pub size_mb: f64,
    pub content_length: i64,
    pub created_at: String,
}

/// Sortable document columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DocumentSort {
    #[default]
    CreatedAt,
    Title,
    VectorCount,
    ContentLength,
}

impl DocumentSort {
    pub fn column(&self) -> &'static str {
        match self {
            DocumentSort::CreatedAt => "created_at",
            DocumentSort::Title => "title",
            DocumentSort::VectorCount => "vector_count",
            DocumentSort::ContentLength => "content_length",
        }
    }
}

impl std::str::FromStr for DocumentSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created_at" => Ok(DocumentSort::CreatedAt),
            "title" => Ok(DocumentSort::Title),
            "vector_count" => Ok(DocumentSort::VectorCount),
            "content_length" => Ok(DocumentSort::ContentLength),
            _ => Err(format!(
                "invalid sort_by field: {}. Must be one of: created_at, title, vector_count, content_length",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Paging and filtering for listings.
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub limit: u32,
    pub offset: u32,
    /// Case-insensitive title substring
    pub search: Option<String>,
    /// Images only: exact tag match
    pub tag: Option<String>,
    pub sort_by: DocumentSort,
    pub sort_order: SortOrder,
}

/// Largest page a listing returns.
pub const MAX_PAGE_SIZE: u32 = 100;

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
            search: None,
            tag: None,
            sort_by: DocumentSort::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl ListQuery {
    /// Limit clamped to 1..=MAX_PAGE_SIZE.
    pub fn page_size(&self) -> u32 {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn search_pattern(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.to_lowercase()))
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, offset: u32, total: i64) -> Self {
        let has_more = (offset as i64 + items.len() as i64) < total;
        Self {
            items,
            total,
            has_more,
        }
    }
}

// ============================================================================
// Image Models
// ============================================================================

/// An uploaded image and its analysis results.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ImageRow {
    pub id: String,
    pub tenant_id: String,
    pub title: String,
    pub filename: String,
    pub size_bytes: i64,
    pub storage_key: String,
    pub content_hash: String,
    /// JSON array
    pub tags: String,
    pub ocr_text: String,
    pub description: String,
    /// JSON array
    pub labels: String,
    pub confidence: f64,
    pub vector_count: i64,
    pub created_at: String,
    pub analyzed_at: Option<String>,
}

impl ImageRow {
    pub fn tags(&self) -> Vec<String> {
        serde_json::from_str(&self.tags).unwrap_or_default()
    }

    pub fn size_mb(&self) -> f64 {
        bytes_to_mb(self.size_bytes.max(0) as usize)
    }
}

/// Updated analysis fields of an image.
#[derive(Debug, Clone, Default)]
pub struct ImageAnalysis {
    pub ocr_text: String,
    pub description: String,
    pub labels: Vec<String>,
    pub confidence: f64,
}

/// Bytes to megabytes (MiB).
pub fn bytes_to_mb(bytes: usize) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

// ============================================================================
// Vector Models
// ============================================================================

/// Vector dimension for embeddings (text-embedding-3-small).
pub const VECTOR_DIM: i32 = 1536;

/// Where an indexed chunk came from.
pub const SOURCE_DOCUMENT: &str = "document";
pub const SOURCE_IMAGE: &str = "image";

/// Metadata stored next to every vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub key: String,
    pub tenant_id: String,
    /// Document id, or image id for image knowledge
    pub document_id: String,
    pub source_type: String,
    pub title: String,
    pub text: String,
    pub created_at: String,
}

/// A record to insert into the vector store.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub metadata: VectorMetadata,
    pub vector: Vec<f32>,
}

/// A search hit from vector similarity search.
#[derive(Debug, Clone)]
pub struct VectorSearchHit {
    pub metadata: VectorMetadata,
    /// L2 distance (lower = more similar)
    pub distance: f32,
}

impl VectorSearchHit {
    /// Convert distance to similarity score (0-1, higher = more similar).
    pub fn score(&self) -> f32 {
        1.0 / (1.0 + self.distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_has_more() {
        let page = Page::new(vec![1, 2], 0, 5);
        assert!(page.has_more);
        let page = Page::new(vec![5], 4, 5);
        assert!(!page.has_more);
    }

    #[test]
    fn test_list_query_clamps_limit() {
        let query = ListQuery {
            limit: 500,
            ..Default::default()
        };
        assert_eq!(query.page_size(), MAX_PAGE_SIZE);
        let query = ListQuery {
            limit: 0,
            ..Default::default()
        };
        assert_eq!(query.page_size(), 1);
    }

    #[test]
    fn test_sort_parse() {
        assert_eq!(
            "vector_count".parse::<DocumentSort>(),
            Ok(DocumentSort::VectorCount)
        );
        assert!("size".parse::<DocumentSort>().is_err());
    }

    #[test]
    fn test_bytes_to_mb() {
        assert_eq!(bytes_to_mb(1024 * 1024 * 5 / 2), 2.5);
    }
}
