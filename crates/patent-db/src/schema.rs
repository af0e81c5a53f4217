//! Table definitions for the patent store.

use sqlx::PgPool;

use patent_core::{Error, Result};

/// Idempotent DDL for every table the repository writes.
pub const SCHEMA_SQL: &str = include_str!("../sql/schema.sql");

/// Create any missing tables in the pool's current schema.
pub async fn apply_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await
        .map_err(Error::Database)?;
    Ok(())
}
