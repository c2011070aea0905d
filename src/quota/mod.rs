//! Quota governance: plan catalog, usage windows and the per-tenant ledger.

mod catalog;
mod ledger;
mod window;

pub use catalog::PlanCatalog;
pub use ledger::{Overage, QuotaLedger, Reservation};
#[cfg(test)]
pub use window::MockClock;
pub use window::{UsageWindow, WindowKeys};
