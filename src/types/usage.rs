use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{QuotaDimension, TenantId};

/// Current usage of one tenant, one field per quota dimension.
///
/// Missing rows read as all-zero records; a periodic counter is only
/// meaningful while its window key matches the current window.
#[derive(Debug, Clone, PartialEq, Default, FromRow, Serialize, Deserialize)]
pub struct UsageRecord {
    pub tenant_id: TenantId,
    pub documents: i64,
    pub vectors: i64,
    pub storage_mb: f64,
    pub monthly_queries: i64,
    pub daily_uploads: i64,
    pub images: i64,
    pub image_storage_mb: f64,
    pub image_vectors: i64,
    pub monthly_image_analyses: i64,
    /// Window key (`YYYY-MM`) of `monthly_queries`
    pub month_year: Option<String>,
    /// Window key (`YYYY-MM-DD`) of `daily_uploads`
    pub upload_date: Option<String>,
    /// Window key (`YYYY-MM`) of `monthly_image_analyses`
    pub analysis_month_year: Option<String>,
    pub last_query_at: Option<String>,
    pub last_upload_at: Option<String>,
    pub last_image_upload_at: Option<String>,
    pub last_delete_at: Option<String>,
}

impl UsageRecord {
    pub fn empty(tenant_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            ..Default::default()
        }
    }

    /// Stored value, regardless of window staleness.
    pub fn stored(&self, dimension: QuotaDimension) -> f64 {
        match dimension {
            QuotaDimension::Documents => self.documents as f64,
            QuotaDimension::Vectors => self.vectors as f64,
            QuotaDimension::StorageMb => self.storage_mb,
            QuotaDimension::MonthlyQueries => self.monthly_queries as f64,
            QuotaDimension::DailyUploads => self.daily_uploads as f64,
            QuotaDimension::Images => self.images as f64,
            QuotaDimension::ImageStorageMb => self.image_storage_mb,
            QuotaDimension::ImageVectors => self.image_vectors as f64,
            QuotaDimension::MonthlyImageAnalyses => self.monthly_image_analyses as f64,
        }
    }

    /// Stored window key of a periodic dimension.
    pub fn window_key(&self, dimension: QuotaDimension) -> Option<&str> {
        match dimension {
            QuotaDimension::MonthlyQueries => self.month_year.as_deref(),
            QuotaDimension::DailyUploads => self.upload_date.as_deref(),
            QuotaDimension::MonthlyImageAnalyses => self.analysis_month_year.as_deref(),
            _ => None,
        }
    }

    /// Most recent activity timestamp of any kind.
    pub fn last_activity(&self) -> Option<&str> {
        [
            &self.last_query_at,
            &self.last_upload_at,
            &self.last_image_upload_at,
            &self.last_delete_at,
        ]
        .into_iter()
        .filter_map(|t| t.as_deref())
        .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_record_is_zero() {
        let usage = UsageRecord::empty("alice");
        for dim in QuotaDimension::ALL {
            assert_eq!(usage.stored(dim), 0.0);
        }
        assert!(usage.last_activity().is_none());
    }

    #[test]
    fn test_last_activity_picks_latest() {
        let usage = UsageRecord {
            last_query_at: Some("2024-03-01T10:00:00+00:00".to_string()),
            last_delete_at: Some("2024-03-02T09:00:00+00:00".to_string()),
            ..UsageRecord::empty("alice")
        };
        assert_eq!(usage.last_activity(), Some("2024-03-02T09:00:00+00:00"));
    }
}
