//! Synchronous filter search behind `POST /filter`.

use std::sync::Arc;
use std::time::Instant;

use futures::future::{try_join, try_join_all};
use tracing::{debug, instrument};

use patent_core::{
    defaults, translate, Error, FilteredPatentsResponse, Filters, PatentProvider, Result,
    ReturnFields,
};

use crate::extract::PatentExtractor;

/// Preview search: one page of summaries plus aggregate statistics.
pub struct FilterService {
    provider: Arc<dyn PatentProvider>,
    extractor: PatentExtractor,
}

/// `(start, count)` of every provider call for one preview page.
///
/// `offset` counts pages of `limit` records; each call fetches at most
/// `chunk` records. A start position that does not fit in an `i64` fails
/// with [`Error::InvalidInput`].
pub fn preview_chunks(limit: i64, offset: i64, chunk: i64) -> Result<Vec<(i64, i64)>> {
    if limit <= 0 || chunk <= 0 {
        return Ok(Vec::new());
    }
    let out_of_range = || {
        Error::InvalidInput(format!(
            "offset {} with limit {} is out of range",
            offset, limit
        ))
    };
    let base = offset.checked_mul(limit).ok_or_else(out_of_range)?;
    (0..limit)
        .step_by(chunk as usize)
        .map(|i| {
            let start = base.checked_add(i).ok_or_else(out_of_range)?;
            Ok((start, chunk.min(limit - i)))
        })
        .collect()
}

impl FilterService {
    pub fn new(provider: Arc<dyn PatentProvider>, extractor: PatentExtractor) -> Self {
        Self {
            provider,
            extractor,
        }
    }

    /// Run the preview search. The first failing provider call fails the
    /// whole request; summaries keep provider page order.
    #[instrument(skip(self, filters), fields(subsystem = "jobs", component = "preview", op = "search"))]
    pub async fn search(&self, filters: &Filters) -> Result<FilteredPatentsResponse> {
        let start = Instant::now();
        let translated = translate(filters)?;
        let filter_set = translated.filter_set(ReturnFields::Preview);
        let chunks =
            preview_chunks(translated.limit, translated.offset, defaults::FILTER_CHUNK_SIZE)?;

        let pages = try_join_all(
            chunks
                .iter()
                .map(|&(from, count)| self.provider.search(&filter_set, from, count)),
        );
        let (pages, statistics) = try_join(pages, self.provider.statistics(&filter_set)).await?;

        let mut patents = Vec::new();
        for page in pages {
            patents.extend(self.extractor.summarize_page(page)?);
        }

        debug!(
            result_count = patents.len(),
            total_found = statistics.total_found,
            duration_ms = start.elapsed().as_millis() as u64,
            "Filter search completed"
        );

        Ok(FilteredPatentsResponse {
            patents,
            statistics: statistics.aggregations,
            total_patents: statistics.total_found,
        })
    }
}
