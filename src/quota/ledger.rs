//! Per-tenant plan and usage bookkeeping.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{PlanCatalog, UsageWindow, WindowKeys};
use crate::local::LocalDb;
use crate::types::{
    DimensionStatus, GovernanceError, Plan, PlanTier, QuotaDimension, QuotaStatus,
    UsageDelta, UsageRecord,
};

/// Result of a single-dimension admission check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaCheck {
    pub allowed: bool,
    /// `"OK"`, or the denial reason
    pub reason: String,
}

impl QuotaCheck {
    fn ok() -> Self {
        Self {
            allowed: true,
            reason: "OK".to_string(),
        }
    }
}

/// Usage charged up front for an operation in flight.
///
/// Either released (the operation failed) or settled against the actual
/// amounts once they are known.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "a reservation must be released or settled"]
pub struct Reservation {
    tenant_id: String,
    deltas: Vec<UsageDelta>,
}

impl Reservation {
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }
}

/// A dimension left above its limit after settling actual usage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overage {
    pub dimension: QuotaDimension,
    pub current: f64,
    pub limit: u64,
}

/// Holds each tenant's plan and usage and admits or denies increments.
///
/// A missing plan reads as the free tier and missing usage as all zeros;
/// rows are only written on first change.
#[derive(Clone)]
pub struct QuotaLedger {
    db: LocalDb,
    catalog: Arc<PlanCatalog>,
    window: UsageWindow,
}

impl QuotaLedger {
    pub fn new(db: LocalDb, catalog: Arc<PlanCatalog>, window: UsageWindow) -> Self {
        Self {
            db,
            catalog,
            window,
        }
    }

    pub fn window(&self) -> &UsageWindow {
        &self.window
    }

    fn now(&self) -> String {
        self.window.now().to_rfc3339()
    }

    /// Current plan of a tenant, free when none was ever set.
    pub async fn plan(&self, tenant_id: &str) -> Result<Plan, GovernanceError> {
        match self.db.get_plan(tenant_id).await? {
            Some(row) => Ok(row.into_plan()),
            None => Ok(Plan::new(
                PlanTier::Free,
                *self.catalog.limits_for(PlanTier::Free),
            )),
        }
    }

    /// Stored usage of a tenant, all zeros when none was ever recorded.
    pub async fn usage(&self, tenant_id: &str) -> Result<UsageRecord, GovernanceError> {
        Ok(self
            .db
            .get_usage(tenant_id)
            .await?
            .unwrap_or_else(|| UsageRecord::empty(tenant_id)))
    }

    /// Would `current + delta` stay within the limit? Reads only.
    pub async fn check(
        &self,
        tenant_id: &str,
        dimension: QuotaDimension,
        delta: f64,
    ) -> Result<QuotaCheck, GovernanceError> {
        let plan = self.plan(tenant_id).await?;
        let usage = self.usage(tenant_id).await?;
        let keys = self.window.keys();

        Ok(check_dimension(&usage, &plan, &keys, dimension, delta))
    }

    /// Apply a delta unconditionally. Negative deltas record deletions.
    pub async fn record(
        &self,
        tenant_id: &str,
        dimension: QuotaDimension,
        delta: f64,
    ) -> Result<(), GovernanceError> {
        self.record_all(tenant_id, &[UsageDelta::new(dimension, delta)])
            .await
    }

    /// Apply several deltas unconditionally, in one statement.
    pub async fn record_all(
        &self,
        tenant_id: &str,
        deltas: &[UsageDelta],
    ) -> Result<(), GovernanceError> {
        let keys = self.window.keys();
        self.db
            .apply_usage(tenant_id, deltas, &keys, &self.now())
            .await?;
        debug!(tenant = tenant_id, ?deltas, "Recorded usage");
        Ok(())
    }

    /// Admit and charge all deltas at once, or none of them.
    ///
    /// Concurrent reservations can never push a dimension over its limit:
    /// the limit test and the increment happen in one conditional update.
    pub async fn reserve(
        &self,
        tenant_id: &str,
        deltas: &[UsageDelta],
    ) -> Result<Reservation, GovernanceError> {
        let plan = self.plan(tenant_id).await?;
        let keys = self.window.keys();
        let bounded: Vec<(UsageDelta, u64)> = deltas
            .iter()
            .map(|d| (*d, plan.limits.get(d.dimension)))
            .collect();

        let admitted = self
            .db
            .reserve_usage(tenant_id, &bounded, &keys, &self.now())
            .await?;

        if !admitted {
            let usage = self.usage(tenant_id).await?;
            let reason = deltas
                .iter()
                .map(|d| check_dimension(&usage, &plan, &keys, d.dimension, d.amount))
                .find(|c| !c.allowed)
                .map(|c| c.reason)
                .unwrap_or_else(|| "Quota exceeded".to_string());
            let status = build_status(tenant_id, &plan, &usage, &keys);

            info!(tenant = tenant_id, %reason, "Quota denied");
            return Err(GovernanceError::QuotaExceeded {
                reason,
                status: Box::new(status),
            });
        }

        debug!(tenant = tenant_id, ?deltas, "Reserved usage");
        Ok(Reservation {
            tenant_id: tenant_id.to_string(),
            deltas: deltas.to_vec(),
        })
    }

    /// Undo a reservation whose operation failed.
    pub async fn release(&self, reservation: Reservation) -> Result<(), GovernanceError> {
        let undo: Vec<UsageDelta> = reservation.deltas.iter().map(UsageDelta::negated).collect();
        self.db
            .apply_usage(
                &reservation.tenant_id,
                &undo,
                &self.window.keys(),
                &self.now(),
            )
            .await?;
        debug!(tenant = %reservation.tenant_id, "Released reservation");
        Ok(())
    }

    /// Replace reserved amounts with actual ones.
    ///
    /// Actual usage is recorded even when it overshoots the estimate; the
    /// dimensions left above their limit are returned.
    pub async fn settle(
        &self,
        reservation: Reservation,
        actual: &[UsageDelta],
    ) -> Result<Vec<Overage>, GovernanceError> {
        let mut correction: Vec<UsageDelta> = actual.to_vec();
        correction.extend(reservation.deltas.iter().map(UsageDelta::negated));

        let tenant_id = reservation.tenant_id.as_str();
        let keys = self.window.keys();
        self.db
            .apply_usage(tenant_id, &correction, &keys, &self.now())
            .await?;

        let plan = self.plan(tenant_id).await?;
        let usage = self.usage(tenant_id).await?;
        let mut overages = Vec::new();
        for delta in actual.iter().filter(|d| d.amount > 0.0) {
            let current = effective(&usage, delta.dimension, &keys);
            let limit = plan.limits.get(delta.dimension);
            let already = overages
                .iter()
                .any(|o: &Overage| o.dimension == delta.dimension);
            if current > limit as f64 && !already {
                warn!(
                    tenant = tenant_id,
                    dimension = %delta.dimension,
                    current,
                    limit,
                    "Actual usage exceeds limit"
                );
                overages.push(Overage {
                    dimension: delta.dimension,
                    current,
                    limit,
                });
            }
        }

        Ok(overages)
    }

    /// Every dimension with its effective value, limit and percentage.
    pub async fn status(&self, tenant_id: &str) -> Result<QuotaStatus, GovernanceError> {
        let plan = self.plan(tenant_id).await?;
        let usage = self.usage(tenant_id).await?;
        Ok(build_status(tenant_id, &plan, &usage, &self.window.keys()))
    }

    /// Replace a tenant's plan. Usage is left untouched, so a downgrade can
    /// leave the tenant above its new limits.
    pub async fn set_plan(&self, tenant_id: &str, plan_name: &str) -> Result<Plan, GovernanceError> {
        let limits = *self.catalog.limits(plan_name)?;
        let tier: PlanTier = plan_name.parse().map_err(GovernanceError::InvalidPlan)?;

        self.db
            .upsert_plan(tenant_id, tier, &limits, &self.now())
            .await?;
        info!(tenant = tenant_id, plan = %tier, "Plan updated");

        self.plan(tenant_id).await
    }
}

impl std::fmt::Debug for QuotaLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaLedger")
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

fn effective(usage: &UsageRecord, dimension: QuotaDimension, keys: &WindowKeys) -> f64 {
    let stored = usage.stored(dimension);
    match dimension.window() {
        Some(window) => {
            UsageWindow::effective_value(stored, usage.window_key(dimension), keys.get(window))
        }
        None => stored,
    }
}

fn check_dimension(
    usage: &UsageRecord,
    plan: &Plan,
    keys: &WindowKeys,
    dimension: QuotaDimension,
    delta: f64,
) -> QuotaCheck {
    let attempted = effective(usage, dimension, keys) + delta;
    let limit = plan.limits.get(dimension);
    if attempted <= limit as f64 {
        QuotaCheck::ok()
    } else {
        QuotaCheck {
            allowed: false,
            reason: dimension.exceeded_reason(attempted, limit as f64),
        }
    }
}

fn build_status(tenant_id: &str, plan: &Plan, usage: &UsageRecord, keys: &WindowKeys) -> QuotaStatus {
    let dimensions = QuotaDimension::ALL
        .into_iter()
        .map(|dim| {
            DimensionStatus::new(
                dim,
                effective(usage, dim, keys),
                plan.limits.get(dim),
                dim.window().map(|w| keys.get(w).to_string()),
            )
        })
        .collect();

    QuotaStatus {
        tenant_id: tenant_id.to_string(),
        plan: plan.tier,
        dimensions,
        last_activity: usage.last_activity().map(str::to_string),
    }
}
