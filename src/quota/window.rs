//! Time-bucket logic for periodic counters.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::types::WindowKind;

/// Source of "now". Injected so window rollovers can be tested.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Decides which daily/monthly window is current and whether a stored
/// counter still belongs to it.
#[derive(Clone)]
pub struct UsageWindow {
    clock: Arc<dyn Clock>,
}

impl UsageWindow {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// `YYYY-MM` in UTC.
    pub fn current_month_key(&self) -> String {
        self.now().format("%Y-%m").to_string()
    }

    /// `YYYY-MM-DD` in UTC.
    pub fn current_day_key(&self) -> String {
        self.now().format("%Y-%m-%d").to_string()
    }

    /// Both current keys, taken from a single reading of the clock.
    pub fn keys(&self) -> WindowKeys {
        let now = self.now();
        WindowKeys {
            day: now.format("%Y-%m-%d").to_string(),
            month: now.format("%Y-%m").to_string(),
        }
    }

    /// A counter stored under another window (or never stored) counts as zero.
    pub fn effective_value(stored_value: f64, stored_key: Option<&str>, current_key: &str) -> f64 {
        if stored_key == Some(current_key) {
            stored_value
        } else {
            0.0
        }
    }
}

/// Current day and month keys at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowKeys {
    pub day: String,
    pub month: String,
}

impl WindowKeys {
    pub fn get(&self, window: WindowKind) -> &str {
        match window {
            WindowKind::Daily => &self.day,
            WindowKind::Monthly => &self.month,
        }
    }
}

impl std::fmt::Debug for UsageWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageWindow").finish_non_exhaustive()
    }
}
