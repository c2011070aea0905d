use serde::{Deserialize, Serialize};

use super::{PlanTier, QuotaDimension, TenantId};

/// Usage of one dimension relative to its limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionStatus {
    pub dimension: QuotaDimension,
    /// Effective value (stale periodic windows read as zero)
    pub current: f64,
    pub max: u64,
    /// 0-100+, and 0 whenever `max == 0`
    pub percentage: f64,
    /// Current window key for periodic dimensions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
}

impl DimensionStatus {
    pub fn new(dimension: QuotaDimension, current: f64, max: u64, window: Option<String>) -> Self {
        Self {
            dimension,
            current,
            max,
            percentage: percentage(current, max),
            window,
        }
    }

    pub fn is_over(&self) -> bool {
        self.current > self.max as f64
    }
}

/// Snapshot of every dimension for one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub tenant_id: TenantId,
    pub plan: PlanTier,
    pub dimensions: Vec<DimensionStatus>,
    pub last_activity: Option<String>,
}

impl QuotaStatus {
    pub fn get(&self, dimension: QuotaDimension) -> Option<&DimensionStatus> {
        self.dimensions.iter().find(|d| d.dimension == dimension)
    }

    /// Effective current value of a dimension (0 if absent).
    pub fn current(&self, dimension: QuotaDimension) -> f64 {
        self.get(dimension).map(|d| d.current).unwrap_or(0.0)
    }
}

fn percentage(current: f64, max: u64) -> f64 {
    if max == 0 {
        0.0
    } else {
        current / max as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_guards_zero_max() {
        let status = DimensionStatus::new(QuotaDimension::Images, 3.0, 0, None);
        assert_eq!(status.percentage, 0.0);
        assert!(status.is_over());
    }

    #[test]
    fn test_percentage() {
        let status = DimensionStatus::new(QuotaDimension::Documents, 25.0, 50, None);
        assert_eq!(status.percentage, 50.0);
        assert!(!status.is_over());
    }
}
