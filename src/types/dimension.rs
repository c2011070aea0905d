use serde::{Deserialize, Serialize};

/// Time window a periodic counter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    /// `YYYY-MM-DD` in UTC
    Daily,
    /// `YYYY-MM` in UTC
    Monthly,
}

/// How a dimension evolves over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionKind {
    /// Never auto-resets; grows on add, shrinks on delete.
    Cumulative,
    /// Resets to zero when the stored window key is not the current one.
    Periodic(WindowKind),
}

/// An independently limited, countable resource.
///
/// Every dimension has exactly one column in the plan table (its limit) and
/// one in the usage table (its current value). Periodic dimensions also own
/// a window-key column in the usage table:
///
/// | Dimension                | Window column         |
/// |--------------------------|-----------------------|
/// | `monthly_queries`        | `month_year`          |
/// | `daily_uploads`          | `upload_date`         |
/// | `monthly_image_analyses` | `analysis_month_year` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaDimension {
    Documents,
    Vectors,
    StorageMb,
    MonthlyQueries,
    DailyUploads,
    Images,
    ImageStorageMb,
    ImageVectors,
    MonthlyImageAnalyses,
}

impl QuotaDimension {
    pub const ALL: [QuotaDimension; 9] = [
        QuotaDimension::Documents,
        QuotaDimension::Vectors,
        QuotaDimension::StorageMb,
        QuotaDimension::MonthlyQueries,
        QuotaDimension::DailyUploads,
        QuotaDimension::Images,
        QuotaDimension::ImageStorageMb,
        QuotaDimension::ImageVectors,
        QuotaDimension::MonthlyImageAnalyses,
    ];

    /// Column name, shared by the plan and usage tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaDimension::Documents => "documents",
            QuotaDimension::Vectors => "vectors",
            QuotaDimension::StorageMb => "storage_mb",
            QuotaDimension::MonthlyQueries => "monthly_queries",
            QuotaDimension::DailyUploads => "daily_uploads",
            QuotaDimension::Images => "images",
            QuotaDimension::ImageStorageMb => "image_storage_mb",
            QuotaDimension::ImageVectors => "image_vectors",
            QuotaDimension::MonthlyImageAnalyses => "monthly_image_analyses",
        }
    }

    pub fn kind(&self) -> DimensionKind {
        match self {
            QuotaDimension::MonthlyQueries | QuotaDimension::MonthlyImageAnalyses => {
                DimensionKind::Periodic(WindowKind::Monthly)
            }
            QuotaDimension::DailyUploads => DimensionKind::Periodic(WindowKind::Daily),
            _ => DimensionKind::Cumulative,
        }
    }

    pub fn window(&self) -> Option<WindowKind> {
        match self.kind() {
            DimensionKind::Periodic(window) => Some(window),
            DimensionKind::Cumulative => None,
        }
    }

    pub fn is_periodic(&self) -> bool {
        self.window().is_some()
    }

    /// Usage-table column holding this dimension's window key.
    pub fn window_column(&self) -> Option<&'static str> {
        match self {
            QuotaDimension::MonthlyQueries => Some("month_year"),
            QuotaDimension::DailyUploads => Some("upload_date"),
            QuotaDimension::MonthlyImageAnalyses => Some("analysis_month_year"),
            _ => None,
        }
    }

    /// Megabyte dimensions carry fractional values; everything else is a count.
    pub fn is_fractional(&self) -> bool {
        matches!(self, QuotaDimension::StorageMb | QuotaDimension::ImageStorageMb)
    }

    /// Human label used in denial reasons ("Document limit exceeded ...").
    pub fn label(&self) -> &'static str {
        match self {
            QuotaDimension::Documents => "Document",
            QuotaDimension::Vectors => "Vector",
            QuotaDimension::StorageMb => "Storage",
            QuotaDimension::MonthlyQueries => "Monthly query",
            QuotaDimension::DailyUploads => "Daily upload",
            QuotaDimension::Images => "Image",
            QuotaDimension::ImageStorageMb => "Image storage",
            QuotaDimension::ImageVectors => "Image vector",
            QuotaDimension::MonthlyImageAnalyses => "Monthly image analysis",
        }
    }

    /// Format an amount of this dimension for display.
    pub fn format_amount(&self, value: f64) -> String {
        if self.is_fractional() {
            format!("{:.2}", value)
        } else {
            format!("{}", value.round() as i64)
        }
    }

    /// Denial reason carrying both the attempted and the limit value.
    pub fn exceeded_reason(&self, attempted: f64, limit: f64) -> String {
        let unit = if self.is_fractional() { " MB" } else { "" };
        format!(
            "{} limit exceeded ({}/{}{})",
            self.label(),
            self.format_amount(attempted),
            limit.round() as i64,
            unit
        )
    }
}

impl std::fmt::Display for QuotaDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for QuotaDimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuotaDimension::ALL
            .into_iter()
            .find(|d| d.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("unknown quota dimension: {}", s))
    }
}

/// A signed amount applied to one dimension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageDelta {
    pub dimension: QuotaDimension,
    pub amount: f64,
}

impl UsageDelta {
    pub fn new(dimension: QuotaDimension, amount: f64) -> Self {
        Self { dimension, amount }
    }

    pub fn one(dimension: QuotaDimension) -> Self {
        Self::new(dimension, 1.0)
    }

    pub fn negated(&self) -> Self {
        Self::new(self.dimension, -self.amount)
    }
}
