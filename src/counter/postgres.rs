//! Postgres-backed counter.
//!
//! A single row (`id = 1`) in `bricks` holds the count. Increments are an atomic
//! upsert so concurrent writers from other processes never lose updates.
//! Periodic snapshots go to `bricks_log`.

use super::backend::{BackendFuture, CounterBackend};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;
use tracing::{info_span, Instrument};

pub const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

const READ_QUERY: &str = "SELECT count FROM bricks WHERE id = 1";

const INCREMENT_QUERY: &str = r"
    INSERT INTO bricks (id, count) VALUES (1, $1)
    ON CONFLICT (id) DO UPDATE SET count = bricks.count + EXCLUDED.count
    RETURNING count
";

const SET_QUERY: &str = r"
    INSERT INTO bricks (id, count) VALUES (1, $1)
    ON CONFLICT (id) DO UPDATE SET count = EXCLUDED.count
    RETURNING count
";

const LOG_QUERY: &str = "INSERT INTO bricks_log (logged_at, count) VALUES ($1, $2)";

#[derive(Clone, Debug)]
pub struct PgCounterBackend {
    pool: PgPool,
}

impl PgCounterBackend {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database and make sure the counter tables exist.
    ///
    /// # Errors
    /// Returns an error if the connection or the schema bootstrap fails.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;

        let backend = Self::new(pool);
        backend.ensure_schema().await?;

        Ok(backend)
    }

    /// Create the counter tables if they are missing.
    ///
    /// # Errors
    /// Returns an error if the schema statements fail.
    pub async fn ensure_schema(&self) -> Result<()> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "CREATE"
        );
        sqlx::Executor::execute(&self.pool, SCHEMA_SQL)
            .instrument(span)
            .await
            .context("failed to execute schema SQL")?;

        Ok(())
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_count(
        &self,
        query: &'static str,
        operation: &'static str,
        value: i64,
    ) -> Result<i64, sqlx::Error> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = operation,
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(value)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;

        row.try_get("count")
    }
}

impl CounterBackend for PgCounterBackend {
    fn read(&self) -> BackendFuture<'_, i64> {
        Box::pin(async move {
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = READ_QUERY
            );
            let row = sqlx::query(READ_QUERY)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await?;

            match row {
                Some(row) => Ok(row.try_get("count")?),
                None => Ok(0),
            }
        })
    }

    fn increment(&self, delta: i64) -> BackendFuture<'_, i64> {
        Box::pin(async move { Ok(self.fetch_count(INCREMENT_QUERY, "UPSERT", delta).await?) })
    }

    fn set(&self, value: i64) -> BackendFuture<'_, i64> {
        Box::pin(async move { Ok(self.fetch_count(SET_QUERY, "UPSERT", value).await?) })
    }

    fn append_log_entry(&self, logged_at: DateTime<Utc>, count: i64) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = LOG_QUERY
            );
            sqlx::query(LOG_QUERY)
                .bind(logged_at)
                .bind(count)
                .execute(&self.pool)
                .instrument(span)
                .await?;

            Ok(())
        })
    }
}
