//! Postgres-backed loader and query layer over a bounded connection
//! pool. All SQL is runtime-checked (`sqlx::query`, not `sqlx::query!`)
//! and rendered from the templates in [`crate::templates`].

use std::time::Duration;

use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use registry_core::error::{RegistryError, Result};
use registry_core::model::Page;

use crate::templates::{
    validate_filter_field, ExtraIndex, SqlParams, SqlTemplates,
};

const MAX_CONNECTIONS: u32 = 128;
const MIN_CONNECTIONS: u32 = 1;
const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);
const MAX_META_KEY_LEN: usize = 16;
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// A structured search: equality filters on root-level document fields,
/// keyset cursor, page size. Field names are validated before the query
/// is rendered; values are always bound parameters.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub filters: Vec<(String, String)>,
    pub cursor: Option<i64>,
    pub limit: i64,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            cursor: None,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: &str, value: &str) -> Self {
        self.filters.push((field.to_string(), value.to_string()));
        self
    }

    pub fn after(mut self, cursor: i64) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

pub struct PostgresStore {
    pool: PgPool,
    templates: SqlTemplates,
    get_company_sql: String,
    meta_read_sql: String,
    meta_save_sql: String,
    bulk_insert_sql: String,
}

impl PostgresStore {
    /// Connects the pool and pre-renders the hot-path statements.
    pub async fn connect(url: &str, schema: &str) -> Result<Self> {
        let templates = SqlTemplates::new(SqlParams::new(schema))?;
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .min_connections(MIN_CONNECTIONS)
            .idle_timeout(IDLE_TIMEOUT)
            .max_lifetime(MAX_LIFETIME)
            .connect(url)
            .await
            .map_err(db_err("connect", schema.to_string()))?;
        let get_company_sql = templates.render("get")?;
        let meta_read_sql = templates.render("meta_read")?;
        let meta_save_sql = templates.render("meta_save")?;
        let bulk_insert_sql = templates.render("bulk_insert")?;
        Ok(Self {
            pool,
            templates,
            get_company_sql,
            meta_read_sql,
            meta_save_sql,
            bulk_insert_sql,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn params(&self) -> &SqlParams {
        self.templates.params()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Creates the company and metadata tables.
    pub async fn create(&self) -> Result<()> {
        info!(table = %self.params().company_table_full(), "creating");
        let sql = self.templates.render("create")?;
        self.exec_batch(&sql, "create").await
    }

    /// Drops both tables; safe to call when they do not exist.
    pub async fn drop(&self) -> Result<()> {
        info!(table = %self.params().company_table_full(), "dropping");
        let sql = self.templates.render("drop")?;
        self.exec_batch(&sql, "drop").await
    }

    /// Loads one batch of `(id, json)` pairs in a single statement.
    /// Re-running an identical batch is a no-op: conflicts on the id are
    /// ignored, so interrupted imports can be retried safely.
    pub async fn create_companies(&self, batch: &[(String, String)]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut ids = Vec::with_capacity(batch.len());
        let mut docs = Vec::with_capacity(batch.len());
        for (id, json) in batch {
            ids.push(id.clone());
            docs.push(json.clone());
        }
        sqlx::query(&self.bulk_insert_sql)
            .bind(ids)
            .bind(docs)
            .execute(&self.pool)
            .await
            .map_err(db_err("create_companies", self.params().company_table_full()))?;
        Ok(())
    }

    /// Returns the stored JSON for a CNPJ, byte-identical to what was
    /// loaded. Absent id is `NotFound`, not a failure.
    pub async fn get_company(&self, id: &str) -> Result<String> {
        sqlx::query_scalar::<_, String>(&self.get_company_sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("get_company", self.params().company_table_full()))?
            .ok_or_else(|| RegistryError::NotFound(format!("cnpj {id}")))
    }

    /// Disables autovacuum on the company table ahead of a bulk load.
    pub async fn pre_load(&self) -> Result<()> {
        let sql = self.templates.render("pre_load")?;
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(db_err("pre_load", self.params().company_table_full()))?;
        Ok(())
    }

    /// Re-enables autovacuum. Harmless without a prior `pre_load`.
    pub async fn post_load(&self) -> Result<()> {
        let sql = self.templates.render("post_load")?;
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(db_err("post_load", self.params().company_table_full()))?;
        Ok(())
    }

    /// Upserts a metadata key/value pair. Keys longer than 16 characters
    /// are rejected before any write.
    pub async fn meta_save(&self, key: &str, value: &str) -> Result<()> {
        validate_meta_key(key)?;
        sqlx::query(&self.meta_save_sql)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(db_err("meta_save", self.params().meta_table_full()))?;
        Ok(())
    }

    pub async fn meta_read(&self, key: &str) -> Result<String> {
        sqlx::query_scalar::<_, String>(&self.meta_read_sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("meta_read", self.params().meta_table_full()))?
            .ok_or_else(|| RegistryError::NotFound(format!("metadata key {key}")))
    }

    /// Keyset-paginated search. Runs inside a transaction with
    /// sequential scans disabled for that transaction only, so the
    /// planner takes the cursor index even on cold statistics.
    pub async fn search(&self, query: &SearchQuery) -> Result<Page> {
        for (field, _) in &query.filters {
            validate_filter_field(field)?;
        }
        #[derive(Serialize)]
        struct FilterBind<'a> {
            field: &'a str,
            param: usize,
        }
        #[derive(Serialize)]
        struct SearchContext<'a> {
            filters: Vec<FilterBind<'a>>,
            cursor_param: Option<usize>,
            limit_param: usize,
        }
        let filters: Vec<FilterBind<'_>> = query
            .filters
            .iter()
            .enumerate()
            .map(|(i, (field, _))| FilterBind { field, param: i + 1 })
            .collect();
        let mut next_param = filters.len() + 1;
        let cursor_param = query.cursor.map(|_| {
            let p = next_param;
            next_param += 1;
            p
        });
        let sql = self.templates.render_with(
            "search",
            &SearchContext {
                filters,
                cursor_param,
                limit_param: next_param,
            },
        )?;
        debug!(query = %sql, "search");

        let target = self.params().company_table_full();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("search", target.clone()))?;
        sqlx::query("SET LOCAL enable_seqscan = off")
            .execute(&mut *tx)
            .await
            .map_err(db_err("search", target.clone()))?;
        let mut stmt = sqlx::query_as::<_, (i64, String)>(&sql);
        for (_, value) in &query.filters {
            stmt = stmt.bind(value);
        }
        if let Some(cursor) = query.cursor {
            stmt = stmt.bind(cursor);
        }
        stmt = stmt.bind(query.limit);
        let rows = stmt
            .fetch_all(&mut *tx)
            .await
            .map_err(db_err("search", target.clone()))?;
        tx.commit().await.map_err(db_err("search", target))?;

        if rows.is_empty() {
            return Ok(Page::empty());
        }
        let cursor = rows.last().map(|(c, _)| c.to_string());
        let mut data = Vec::with_capacity(rows.len());
        for (_, json) in rows {
            data.push(
                serde_json::from_str(&json)
                    .map_err(|e| anyhow::anyhow!("stored document is not json: {e}"))?,
            );
        }
        Ok(Page { data, cursor })
    }

    /// Creates the requested secondary indexes in one transactional DDL
    /// batch: either every index exists afterwards or none was added.
    /// Names are validated before anything is rendered or executed.
    pub async fn create_extra_indexes(&self, names: &[String]) -> Result<()> {
        let indexes = names
            .iter()
            .map(|n| ExtraIndex::parse(n))
            .collect::<Result<Vec<_>>>()?;
        if indexes.is_empty() {
            return Ok(());
        }
        #[derive(Serialize)]
        struct IndexBatch {
            indexes: Vec<ExtraIndex>,
        }
        let count = indexes.len();
        let sql = self
            .templates
            .render_with("extra_indexes", &IndexBatch { indexes })?;
        self.exec_batch(&sql, "create_extra_indexes").await?;
        info!(
            count,
            table = %self.params().company_table_full(),
            "extra indexes created"
        );
        Ok(())
    }

    /// Executes a rendered multi-statement batch inside one transaction.
    async fn exec_batch(&self, sql: &str, operation: &'static str) -> Result<()> {
        let target = self.params().company_table_full();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err(operation, target.clone()))?;
        for stmt in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(stmt)
                .execute(&mut *tx)
                .await
                .map_err(db_err(operation, target.clone()))?;
        }
        tx.commit().await.map_err(db_err(operation, target))
    }
}

/// Metadata keys are capped by the column definition; reject early so a
/// failed save never reaches the database.
pub fn validate_meta_key(key: &str) -> Result<()> {
    if key.len() > MAX_META_KEY_LEN {
        return Err(RegistryError::Validation(format!(
            "metadata key {key:?} exceeds {MAX_META_KEY_LEN} characters"
        )));
    }
    Ok(())
}

fn db_err(
    operation: &'static str,
    target: String,
) -> impl FnOnce(sqlx::Error) -> RegistryError {
    move |e| RegistryError::Connectivity {
        operation,
        target,
        source: anyhow::Error::new(e),
    }
}
