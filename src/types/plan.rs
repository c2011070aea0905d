use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::QuotaDimension;

/// Billing tier - determines the limit of every quota dimension.
///
/// # Tier Limits
/// | Dimension              | Free | Basic  | Premium |
/// |------------------------|------|--------|---------|
/// | documents              | 50   | 200    | 1000    |
/// | vectors                | 5k   | 20k    | 100k    |
/// | storage_mb             | 50   | 200    | 1000    |
/// | monthly_queries        | 500  | 2000   | 10000   |
/// | daily_uploads          | 5    | 20     | 100     |
/// | images                 | 20   | 100    | 500     |
/// | image_storage_mb       | 100  | 500    | 2000    |
/// | image_vectors          | 1000 | 5000   | 20000   |
/// | monthly_image_analyses | 50   | 200    | 1000    |
///
/// Variants are declared in ascending order so `Ord` follows the tier ladder.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Basic,
    Premium,
}

impl PlanTier {
    pub const ALL: [PlanTier; 3] = [PlanTier::Free, PlanTier::Basic, PlanTier::Premium];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Basic => "basic",
            PlanTier::Premium => "premium",
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(PlanTier::Free),
            "basic" => Ok(PlanTier::Basic),
            "premium" => Ok(PlanTier::Premium),
            _ => Err(format!("unknown plan: {}", s)),
        }
    }
}

/// One ceiling per quota dimension. Every field is always present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub documents: u64,
    pub vectors: u64,
    pub storage_mb: u64,
    pub monthly_queries: u64,
    pub daily_uploads: u64,
    pub images: u64,
    pub image_storage_mb: u64,
    pub image_vectors: u64,
    pub monthly_image_analyses: u64,
}

impl Limits {
    pub fn get(&self, dimension: QuotaDimension) -> u64 {
        match dimension {
            QuotaDimension::Documents => self.documents,
            QuotaDimension::Vectors => self.vectors,
            QuotaDimension::StorageMb => self.storage_mb,
            QuotaDimension::MonthlyQueries => self.monthly_queries,
            QuotaDimension::DailyUploads => self.daily_uploads,
            QuotaDimension::Images => self.images,
            QuotaDimension::ImageStorageMb => self.image_storage_mb,
            QuotaDimension::ImageVectors => self.image_vectors,
            QuotaDimension::MonthlyImageAnalyses => self.monthly_image_analyses,
        }
    }

    pub fn set(&mut self, dimension: QuotaDimension, value: u64) {
        let slot = match dimension {
            QuotaDimension::Documents => &mut self.documents,
            QuotaDimension::Vectors => &mut self.vectors,
            QuotaDimension::StorageMb => &mut self.storage_mb,
            QuotaDimension::MonthlyQueries => &mut self.monthly_queries,
            QuotaDimension::DailyUploads => &mut self.daily_uploads,
            QuotaDimension::Images => &mut self.images,
            QuotaDimension::ImageStorageMb => &mut self.image_storage_mb,
            QuotaDimension::ImageVectors => &mut self.image_vectors,
            QuotaDimension::MonthlyImageAnalyses => &mut self.monthly_image_analyses,
        };
        *slot = value;
    }
}

/// Partial limit overrides, as read from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOverrides {
    pub documents: Option<u64>,
    pub vectors: Option<u64>,
    pub storage_mb: Option<u64>,
    pub monthly_queries: Option<u64>,
    pub daily_uploads: Option<u64>,
    pub images: Option<u64>,
    pub image_storage_mb: Option<u64>,
    pub image_vectors: Option<u64>,
    pub monthly_image_analyses: Option<u64>,
}

impl LimitOverrides {
    pub fn apply_to(&self, limits: &mut Limits) {
        let pairs = [
            (QuotaDimension::Documents, self.documents),
            (QuotaDimension::Vectors, self.vectors),
            (QuotaDimension::StorageMb, self.storage_mb),
            (QuotaDimension::MonthlyQueries, self.monthly_queries),
            (QuotaDimension::DailyUploads, self.daily_uploads),
            (QuotaDimension::Images, self.images),
            (QuotaDimension::ImageStorageMb, self.image_storage_mb),
            (QuotaDimension::ImageVectors, self.image_vectors),
            (QuotaDimension::MonthlyImageAnalyses, self.monthly_image_analyses),
        ];
        for (dimension, value) in pairs {
            if let Some(value) = value {
                limits.set(dimension, value);
            }
        }
    }
}

/// A tenant's plan record: the tier reference plus the limits in force.
///
/// Replaced wholesale on upgrade/downgrade; usage is never touched by a
/// plan change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub tier: PlanTier,
    pub limits: Limits,
    /// `None` while the plan is a lazily derived default that was never persisted
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Plan {
    pub fn new(tier: PlanTier, limits: Limits) -> Self {
        Self {
            tier,
            limits,
            created_at: None,
            updated_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tier() {
        assert_eq!("Premium".parse::<PlanTier>(), Ok(PlanTier::Premium));
        assert_eq!(" basic ".parse::<PlanTier>(), Ok(PlanTier::Basic));
        assert!("enterprise".parse::<PlanTier>().is_err());
        assert_eq!(PlanTier::default(), PlanTier::Free);
    }

    #[test]
    fn test_tier_order() {
        assert!(PlanTier::Free < PlanTier::Basic);
        assert!(PlanTier::Basic < PlanTier::Premium);
    }

    #[test]
    fn test_overrides_only_touch_given_fields() {
        let mut limits = Limits {
            documents: 1,
            vectors: 2,
            storage_mb: 3,
            monthly_queries: 4,
            daily_uploads: 5,
            images: 6,
            image_storage_mb: 7,
            image_vectors: 8,
            monthly_image_analyses: 9,
        };
        let overrides = LimitOverrides {
            vectors: Some(200),
            ..Default::default()
        };
        overrides.apply_to(&mut limits);

        assert_eq!(limits.get(QuotaDimension::Vectors), 200);
        assert_eq!(limits.get(QuotaDimension::Documents), 1);
        assert_eq!(limits.get(QuotaDimension::MonthlyImageAnalyses), 9);
    }
}
