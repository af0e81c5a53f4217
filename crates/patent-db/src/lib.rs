//! # patent-db
//!
//! PostgreSQL persistence for normalized patent records.
//!
//! This crate provides:
//! - Connection pool management
//! - [`PgPatentRepository`], the transactional batched [`patent_core::PatentStore`]
//! - The relational schema (`sql/schema.sql`)

pub mod patents;
pub mod pool;
pub mod schema;
pub mod test_fixtures;

pub use patents::PgPatentRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, ping, PoolConfig};
pub use schema::{apply_schema, SCHEMA_SQL};
