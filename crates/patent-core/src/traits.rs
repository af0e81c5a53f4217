//! Trait seams between the pipeline and its external collaborators.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{FilterSet, PatentRecord, RawPage, SearchStatistics};
use crate::Result;

/// Upstream patent search provider.
///
/// Implementations hold no per-call mutable state and are shared across the
/// fetch workers of a run.
#[async_trait]
pub trait PatentProvider: Send + Sync {
    /// Fetch `count` records starting at `offset` as an unparsed page.
    async fn search(&self, filters: &FilterSet, offset: i64, count: i64) -> Result<RawPage>;

    /// Aggregations and total hit count for `filters`.
    async fn statistics(&self, filters: &FilterSet) -> Result<SearchStatistics>;
}

/// Transactional sink for normalized patent records.
#[async_trait]
pub trait PatentStore: Send + Sync {
    /// Persist all `records` and link them to the job's transaction and
    /// bundle. Either everything is committed or nothing is.
    async fn save(&self, records: &[PatentRecord], transaction_id: Uuid, bundle_id: Uuid)
        -> Result<()>;
}
