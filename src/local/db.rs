//! SQLite database operations for the tenant ledger.
//!
//! Holds the plan and usage tables the quota ledger runs on, plus the
//! per-tenant document and image registries.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool};

use super::models::{DocumentRow, ImageAnalysis, ImageRow, ListQuery, Page, PlanRow};
use crate::quota::WindowKeys;
use crate::types::{Limits, PlanTier, QuotaDimension, UsageDelta, UsageRecord};

/// Local SQLite database.
#[derive(Clone)]
pub struct LocalDb {
    pool: SqlitePool,
}

impl LocalDb {
    /// Open or create the database at the given path.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to open SQLite database")?;

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<()> {
        let limit_columns: Vec<String> = QuotaDimension::ALL
            .iter()
            .map(|d| format!("{} INTEGER NOT NULL", d.as_str()))
            .collect();

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS tenant_plans (
                tenant_id TEXT PRIMARY KEY,
                plan_type TEXT NOT NULL,
                {},
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            limit_columns.join(",\n                ")
        ))
        .execute(&self.pool)
        .await?;

        let usage_columns: Vec<String> = QuotaDimension::ALL
            .iter()
            .map(|d| {
                let ty = if d.is_fractional() { "REAL" } else { "INTEGER" };
                format!("{} {} NOT NULL DEFAULT 0", d.as_str(), ty)
            })
            .collect();

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS tenant_usage (
                tenant_id TEXT PRIMARY KEY,
                {},
                month_year TEXT,
                upload_date TEXT,
                analysis_month_year TEXT,
                last_query_at TEXT,
                last_upload_at TEXT,
                last_image_upload_at TEXT,
                last_delete_at TEXT,
                updated_at TEXT NOT NULL
            )
            "#,
            usage_columns.join(",\n                ")
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                title TEXT NOT NULL,
                filename TEXT,
                vector_count INTEGER NOT NULL,
                size_mb REAL NOT NULL,
                content_length INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS images (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                title TEXT NOT NULL,
                filename TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                storage_key TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                tags TEXT NOT NULL,
                ocr_text TEXT NOT NULL,
                description TEXT NOT NULL,
                labels TEXT NOT NULL,
                confidence REAL NOT NULL,
                vector_count INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                analyzed_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_tenant ON documents(tenant_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_images_tenant ON images(tenant_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Plan Operations ====================

    /// Find the stored plan of a tenant.
    pub async fn get_plan(&self, tenant_id: &str) -> Result<Option<PlanRow>> {
        let row = sqlx::query_as::<_, PlanRow>("SELECT * FROM tenant_plans WHERE tenant_id = ?")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    /// Insert or replace a tenant's plan. `created_at` survives replacement.
    pub async fn upsert_plan(
        &self,
        tenant_id: &str,
        tier: PlanTier,
        limits: &Limits,
        now: &str,
    ) -> Result<()> {
        let columns: Vec<&str> = QuotaDimension::ALL.iter().map(|d| d.as_str()).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let updates: Vec<String> = columns
            .iter()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();

        let sql = format!(
            r#"
            INSERT INTO tenant_plans (tenant_id, plan_type, {}, created_at, updated_at)
            VALUES (?, ?, {}, ?, ?)
            ON CONFLICT(tenant_id) DO UPDATE SET
                plan_type = excluded.plan_type,
                {},
                updated_at = excluded.updated_at
            "#,
            columns.join(", "),
            placeholders,
            updates.join(",\n                "),
        );

        let mut query = sqlx::query(&sql).bind(tenant_id).bind(tier.as_str());
        for dim in QuotaDimension::ALL {
            query = query.bind(limits.get(dim) as i64);
        }
        query
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .context("Failed to store plan")?;

        Ok(())
    }

    // ==================== Usage Operations ====================

    /// Find the stored usage of a tenant.
    pub async fn get_usage(&self, tenant_id: &str) -> Result<Option<UsageRecord>> {
        let row =
            sqlx::query_as::<_, UsageRecord>("SELECT * FROM tenant_usage WHERE tenant_id = ?")
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row)
    }

    /// Create the all-zero usage row if the tenant has none yet.
    async fn ensure_usage(&self, tenant_id: &str, now: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO tenant_usage (tenant_id, updated_at) VALUES (?, ?) ON CONFLICT(tenant_id) DO NOTHING",
        )
        .bind(tenant_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Apply deltas unconditionally.
    ///
    /// Periodic counters whose window key is stale restart from zero, and
    /// their window key moves to the current one.
    pub async fn apply_usage(
        &self,
        tenant_id: &str,
        deltas: &[UsageDelta],
        keys: &WindowKeys,
        now: &str,
    ) -> Result<()> {
        let deltas: Vec<_> = merge_deltas(deltas)
            .into_iter()
            .filter(|d| d.amount != 0.0)
            .collect();
        if deltas.is_empty() {
            return Ok(());
        }

        self.ensure_usage(tenant_id, now).await?;

        let update = UsageUpdate::new(&deltas, keys, now);
        let sql = format!(
            "UPDATE tenant_usage SET {} WHERE tenant_id = ?",
            update.sets.join(", ")
        );
        let mut binds = update.binds;
        binds.push(Bind::Text(tenant_id.to_string()));

        bind_all(sqlx::query(&sql), binds)
            .execute(&self.pool)
            .await
            .context("Failed to update usage")?;

        Ok(())
    }

    /// Atomically increment every dimension, but only if each one stays
    /// within its limit. Either all deltas are applied or none is.
    ///
    /// Returns `false` when at least one limit would be exceeded.
    pub async fn reserve_usage(
        &self,
        tenant_id: &str,
        deltas: &[(UsageDelta, u64)],
        keys: &WindowKeys,
        now: &str,
    ) -> Result<bool> {
        let merged = merge_deltas(&deltas.iter().map(|(d, _)| *d).collect::<Vec<_>>());
        if merged.is_empty() {
            return Ok(true);
        }

        self.ensure_usage(tenant_id, now).await?;

        let update = UsageUpdate::new(&merged, keys, now);
        let mut conditions = vec!["tenant_id = ?".to_string()];
        let mut binds = update.binds;
        binds.push(Bind::Text(tenant_id.to_string()));

        // A zero delta still requires the dimension to be within its limit;
        // only negative deltas are exempt.
        for delta in merged.iter().filter(|d| d.amount >= 0.0) {
            // Several entries for the same dimension share the tightest limit.
            let limit = deltas
                .iter()
                .filter(|(d, _)| d.dimension == delta.dimension)
                .map(|(_, limit)| *limit)
                .min()
                .unwrap_or(0);
            let (effective, mut effective_binds) = effective_expr(delta.dimension, keys);
            conditions.push(format!("{} + ? <= ?", effective));
            binds.append(&mut effective_binds);
            binds.push(amount_bind(delta));
            binds.push(Bind::Real(limit as f64));
        }

        let sql = format!(
            "UPDATE tenant_usage SET {} WHERE {}",
            update.sets.join(", "),
            conditions.join(" AND ")
        );

        let result = bind_all(sqlx::query(&sql), binds)
            .execute(&self.pool)
            .await
            .context("Failed to reserve usage")?;

        Ok(result.rows_affected() == 1)
    }

    // ==================== Document Operations ====================

    /// Register a document.
    pub async fn insert_document(&self, doc: &DocumentRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (
                id, tenant_id, title, filename, vector_count, size_mb, content_length, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.tenant_id)
        .bind(&doc.title)
        .bind(&doc.filename)
        .bind(doc.vector_count)
        .bind(doc.size_mb)
        .bind(doc.content_length)
        .bind(&doc.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Find a document owned by the tenant.
    pub async fn get_document(&self, tenant_id: &str, id: &str) -> Result<Option<DocumentRow>> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT * FROM documents WHERE tenant_id = ? AND id = ?",
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Delete a document owned by the tenant. Returns whether a row was removed.
    pub async fn delete_document(&self, tenant_id: &str, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE tenant_id = ? AND id = ?")
            .bind(tenant_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List a tenant's documents.
    pub async fn list_documents(
        &self,
        tenant_id: &str,
        query: &ListQuery,
    ) -> Result<Page<DocumentRow>> {
        let pattern = query.search_pattern();
        let filter = if pattern.is_some() {
            "tenant_id = ? AND lower(title) LIKE ?"
        } else {
            "tenant_id = ?"
        };

        let sql = format!(
            "SELECT * FROM documents WHERE {} ORDER BY {} {}, id ASC LIMIT ? OFFSET ?",
            filter,
            query.sort_by.column(),
            query.sort_order.keyword()
        );
        let mut rows = sqlx::query_as::<_, DocumentRow>(&sql).bind(tenant_id);
        if let Some(ref p) = pattern {
            rows = rows.bind(p);
        }
        let items = rows
            .bind(query.page_size() as i64)
            .bind(query.offset as i64)
            .fetch_all(&self.pool)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM documents WHERE {}", filter);
        let mut count = sqlx::query_scalar::<_, i64>(&count_sql).bind(tenant_id);
        if let Some(ref p) = pattern {
            count = count.bind(p);
        }
        let total = count.fetch_one(&self.pool).await?;

        Ok(Page::new(items, query.offset, total))
    }

    // ==================== Image Operations ====================

    /// Register an image.
    pub async fn insert_image(&self, image: &ImageRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO images (
                id, tenant_id, title, filename, size_bytes, storage_key, content_hash,
                tags, ocr_text, description, labels, confidence, vector_count,
                created_at, analyzed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&image.id)
        .bind(&image.tenant_id)
        .bind(&image.title)
        .bind(&image.filename)
        .bind(image.size_bytes)
        .bind(&image.storage_key)
        .bind(&image.content_hash)
        .bind(&image.tags)
        .bind(&image.ocr_text)
        .bind(&image.description)
        .bind(&image.labels)
        .bind(image.confidence)
        .bind(image.vector_count)
        .bind(&image.created_at)
        .bind(&image.analyzed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Find an image owned by the tenant.
    pub async fn get_image(&self, tenant_id: &str, id: &str) -> Result<Option<ImageRow>> {
        let row =
            sqlx::query_as::<_, ImageRow>("SELECT * FROM images WHERE tenant_id = ? AND id = ?")
                .bind(tenant_id)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row)
    }

    /// Store fresh analysis results for an image.
    pub async fn update_image_analysis(
        &self,
        tenant_id: &str,
        id: &str,
        analysis: &ImageAnalysis,
        now: &str,
    ) -> Result<()> {
        let labels = serde_json::to_string(&analysis.labels)?;

        sqlx::query(
            r#"
            UPDATE images SET
                ocr_text = ?, description = ?, labels = ?, confidence = ?, analyzed_at = ?
            WHERE tenant_id = ? AND id = ?
            "#,
        )
        .bind(&analysis.ocr_text)
        .bind(&analysis.description)
        .bind(&labels)
        .bind(analysis.confidence)
        .bind(now)
        .bind(tenant_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete an image owned by the tenant. Returns whether a row was removed.
    pub async fn delete_image(&self, tenant_id: &str, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM images WHERE tenant_id = ? AND id = ?")
            .bind(tenant_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List a tenant's images, newest first.
    pub async fn list_images(&self, tenant_id: &str, query: &ListQuery) -> Result<Page<ImageRow>> {
        let pattern = query.search_pattern();
        let tag = query
            .tag
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(serde_json::to_string)
            .transpose()?;

        let mut filter = "tenant_id = ?".to_string();
        if pattern.is_some() {
            filter.push_str(" AND lower(title) LIKE ?");
        }
        if tag.is_some() {
            filter.push_str(" AND instr(tags, ?) > 0");
        }

        let sql = format!(
            "SELECT * FROM images WHERE {} ORDER BY created_at DESC, id ASC LIMIT ? OFFSET ?",
            filter
        );
        let mut rows = sqlx::query_as::<_, ImageRow>(&sql).bind(tenant_id);
        if let Some(ref p) = pattern {
            rows = rows.bind(p);
        }
        if let Some(ref t) = tag {
            rows = rows.bind(t);
        }
        let items = rows
            .bind(query.page_size() as i64)
            .bind(query.offset as i64)
            .fetch_all(&self.pool)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM images WHERE {}", filter);
        let mut count = sqlx::query_scalar::<_, i64>(&count_sql).bind(tenant_id);
        if let Some(ref p) = pattern {
            count = count.bind(p);
        }
        if let Some(ref t) = tag {
            count = count.bind(t);
        }
        let total = count.fetch_one(&self.pool).await?;

        Ok(Page::new(items, query.offset, total))
    }
}

// ==================== Usage SQL Building ====================

/// A positional parameter for dynamically built statements.
enum Bind {
    Text(String),
    Int(i64),
    Real(f64),
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    binds: Vec<Bind>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for bind in binds {
        query = match bind {
            Bind::Text(s) => query.bind(s),
            Bind::Int(i) => query.bind(i),
            Bind::Real(f) => query.bind(f),
        };
    }
    query
}

fn amount_bind(delta: &UsageDelta) -> Bind {
    if delta.dimension.is_fractional() {
        Bind::Real(delta.amount)
    } else {
        Bind::Int(delta.amount.round() as i64)
    }
}

/// SQL expression for the effective current value of a dimension.
fn effective_expr(dimension: QuotaDimension, keys: &WindowKeys) -> (String, Vec<Bind>) {
    let column = dimension.as_str();
    match (dimension.window(), dimension.window_column()) {
        (Some(window), Some(window_column)) => (
            format!("(CASE WHEN {window_column} = ? THEN {column} ELSE 0 END)"),
            vec![Bind::Text(keys.get(window).to_string())],
        ),
        _ => (column.to_string(), Vec::new()),
    }
}

/// Timestamp column touched by a delta.
fn activity_column(delta: &UsageDelta) -> &'static str {
    if delta.amount < 0.0 {
        return "last_delete_at";
    }
    match delta.dimension {
        QuotaDimension::MonthlyQueries => "last_query_at",
        QuotaDimension::Images
        | QuotaDimension::ImageStorageMb
        | QuotaDimension::ImageVectors
        | QuotaDimension::MonthlyImageAnalyses => "last_image_upload_at",
        _ => "last_upload_at",
    }
}

/// Sum deltas per dimension, keeping first-seen order.
fn merge_deltas(deltas: &[UsageDelta]) -> Vec<UsageDelta> {
    let mut merged: Vec<UsageDelta> = Vec::new();
    for delta in deltas {
        match merged.iter_mut().find(|d| d.dimension == delta.dimension) {
            Some(existing) => existing.amount += delta.amount,
            None => merged.push(*delta),
        }
    }
    merged
}

/// SET clauses (and their parameters, in order) for a usage update.
struct UsageUpdate {
    sets: Vec<String>,
    binds: Vec<Bind>,
}

impl UsageUpdate {
    fn new(deltas: &[UsageDelta], keys: &WindowKeys, now: &str) -> Self {
        let mut sets = Vec::new();
        let mut binds = Vec::new();
        let mut activity = BTreeSet::new();

        for delta in deltas {
            let column = delta.dimension.as_str();
            let (effective, mut effective_binds) = effective_expr(delta.dimension, keys);

            match (delta.dimension.window(), delta.dimension.window_column()) {
                (Some(window), Some(window_column)) => {
                    // Periodic counters never drop below zero.
                    sets.push(format!("{column} = MAX({effective} + ?, 0)"));
                    binds.append(&mut effective_binds);
                    binds.push(amount_bind(delta));
                    sets.push(format!("{window_column} = ?"));
                    binds.push(Bind::Text(keys.get(window).to_string()));
                }
                _ => {
                    sets.push(format!("{column} = {effective} + ?"));
                    binds.push(amount_bind(delta));
                }
            }

            if delta.amount != 0.0 {
                activity.insert(activity_column(delta));
            }
        }

        for column in activity {
            sets.push(format!("{column} = ?"));
            binds.push(Bind::Text(now.to_string()));
        }
        sets.push("updated_at = ?".to_string());
        binds.push(Bind::Text(now.to_string()));

        Self { sets, binds }
    }
}
