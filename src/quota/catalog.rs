//! Plan tier → limits lookup.

use std::collections::BTreeMap;

use crate::types::{GovernanceError, LimitOverrides, Limits, PlanTier, QuotaDimension};

const FREE: Limits = Limits {
    documents: 50,
    vectors: 5_000,
    storage_mb: 50,
    monthly_queries: 500,
    daily_uploads: 5,
    images: 20,
    image_storage_mb: 100,
    image_vectors: 1_000,
    monthly_image_analyses: 50,
};

const BASIC: Limits = Limits {
    documents: 200,
    vectors: 20_000,
    storage_mb: 200,
    monthly_queries: 2_000,
    daily_uploads: 20,
    images: 100,
    image_storage_mb: 500,
    image_vectors: 5_000,
    monthly_image_analyses: 200,
};

const PREMIUM: Limits = Limits {
    documents: 1_000,
    vectors: 100_000,
    storage_mb: 1_000,
    monthly_queries: 10_000,
    daily_uploads: 100,
    images: 500,
    image_storage_mb: 2_000,
    image_vectors: 20_000,
    monthly_image_analyses: 1_000,
};

/// Immutable mapping from plan tier to limits.
///
/// Built once at startup and read-only afterwards. Tiers are monotonic:
/// every limit of a lower tier is at most the same limit of a higher tier.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanCatalog {
    plans: BTreeMap<PlanTier, Limits>,
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PlanCatalog {
    /// The three built-in tiers.
    pub fn builtin() -> Self {
        let plans = BTreeMap::from([
            (PlanTier::Free, FREE),
            (PlanTier::Basic, BASIC),
            (PlanTier::Premium, PREMIUM),
        ]);
        Self { plans }
    }

    /// Built-in tiers with per-tier overrides applied.
    ///
    /// Fails if the result is no longer monotonic across tiers.
    pub fn with_overrides(
        overrides: &BTreeMap<PlanTier, LimitOverrides>,
    ) -> Result<Self, GovernanceError> {
        let mut catalog = Self::builtin();
        for (tier, o) in overrides {
            if let Some(limits) = catalog.plans.get_mut(tier) {
                o.apply_to(limits);
            }
        }
        catalog.validate()?;
        Ok(catalog)
    }

    /// Limits for a plan name. Unknown names fail with `InvalidPlan`.
    pub fn limits(&self, plan_name: &str) -> Result<&Limits, GovernanceError> {
        let tier: PlanTier = plan_name.parse().map_err(GovernanceError::InvalidPlan)?;
        Ok(self.limits_for(tier))
    }

    pub fn limits_for(&self, tier: PlanTier) -> &Limits {
        // Every tier is inserted by `builtin`, overrides only mutate.
        &self.plans[&tier]
    }

    pub fn tiers(&self) -> impl Iterator<Item = (PlanTier, &Limits)> {
        self.plans.iter().map(|(tier, limits)| (*tier, limits))
    }

    /// Check the tier ladder is monotonic in every dimension.
    pub fn validate(&self) -> Result<(), GovernanceError> {
        let ladder: Vec<_> = self.tiers().collect();
        for pair in ladder.windows(2) {
            let (lower_tier, lower) = pair[0];
            let (upper_tier, upper) = pair[1];
            if let Some(dim) = QuotaDimension::ALL
                .into_iter()
                .find(|d| lower.get(*d) > upper.get(*d))
            {
                return Err(GovernanceError::InvalidPlan(format!(
                    "{} limit of {} ({}) exceeds {} ({})",
                    dim,
                    lower_tier,
                    lower.get(dim),
                    upper_tier,
                    upper.get(dim)
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiers_are_monotonic() {
        let catalog = PlanCatalog::builtin();
        for lower in PlanTier::ALL {
            for upper in PlanTier::ALL.into_iter().filter(|t| *t >= lower) {
                for dim in QuotaDimension::ALL {
                    assert!(
                        catalog.limits_for(lower).get(dim) <= catalog.limits_for(upper).get(dim),
                        "{dim}: {lower} > {upper}"
                    );
                }
            }
        }
        assert!(catalog.validate().is_ok());
    }

    #[test]
    fn test_higher_tiers_strictly_increase() {
        let catalog = PlanCatalog::builtin();
        for dim in QuotaDimension::ALL {
            let free = catalog.limits_for(PlanTier::Free).get(dim);
            let basic = catalog.limits_for(PlanTier::Basic).get(dim);
            let premium = catalog.limits_for(PlanTier::Premium).get(dim);
            assert!(free < basic && basic < premium, "{dim}");
        }
    }

    #[test]
    fn test_lookup_by_name() {
        let catalog = PlanCatalog::builtin();
        assert_eq!(catalog.limits("free").unwrap().documents, 50);
        assert_eq!(catalog.limits("premium").unwrap().vectors, 100_000);
        assert!(matches!(
            catalog.limits("gold"),
            Err(GovernanceError::InvalidPlan(_))
        ));
    }

    #[test]
    fn test_overrides_apply() {
        let overrides = BTreeMap::from([(
            PlanTier::Basic,
            LimitOverrides {
                documents: Some(300),
                ..Default::default()
            },
        )]);
        let catalog = PlanCatalog::with_overrides(&overrides).unwrap();
        assert_eq!(catalog.limits_for(PlanTier::Basic).documents, 300);
        assert_eq!(catalog.limits_for(PlanTier::Free).documents, 50);
    }

    #[test]
    fn test_overrides_breaking_monotonicity_are_rejected() {
        let overrides = BTreeMap::from([(
            PlanTier::Free,
            LimitOverrides {
                images: Some(10_000),
                ..Default::default()
            },
        )]);
        assert!(matches!(
            PlanCatalog::with_overrides(&overrides),
            Err(GovernanceError::InvalidPlan(_))
        ));
    }
}
