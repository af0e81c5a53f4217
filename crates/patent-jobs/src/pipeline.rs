//! Concurrent fetch/parse pipeline for one ingestion run.
//!
//! A dispatcher feeds page offsets to a pool of fetch workers; raw pages flow
//! through a bounded queue to a smaller pool of parse workers that append
//! normalized records to a shared collection. The first error recorded by any
//! task fails the whole run.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

use patent_core::{defaults, Error, FilterSet, PatentProvider, PatentRecord, RawPage, Result};

use crate::extract::PatentExtractor;

/// Pipeline sizing.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Records requested per provider page.
    pub page_size: i64,
    pub fetch_workers: usize,
    pub parse_workers: usize,
    /// Capacity of the offset and raw page queues.
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_size: defaults::PAGE_SIZE,
            fetch_workers: defaults::FETCH_WORKERS,
            parse_workers: defaults::PARSE_WORKERS,
            queue_capacity: defaults::RAW_PAGE_QUEUE_CAPACITY,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `PIPELINE_PAGE_SIZE` | `20` | Records per provider page |
    /// | `PIPELINE_FETCH_WORKERS` | `8` | Concurrent page fetchers |
    /// | `PIPELINE_PARSE_WORKERS` | `2` | Concurrent page parsers |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            page_size: env_or("PIPELINE_PAGE_SIZE", defaults.page_size).max(1),
            fetch_workers: env_or("PIPELINE_FETCH_WORKERS", defaults.fetch_workers).max(1),
            parse_workers: env_or("PIPELINE_PARSE_WORKERS", defaults.parse_workers).max(1),
            queue_capacity: defaults.queue_capacity,
        }
    }

    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_workers(mut self, fetch: usize, parse: usize) -> Self {
        self.fetch_workers = fetch.max(1);
        self.parse_workers = parse.max(1);
        self
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Lifecycle of a run, logged at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Started,
    Fetching,
    Aggregating,
    Done,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Started => "started",
            PipelineStage::Fetching => "fetching",
            PipelineStage::Aggregating => "aggregating",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Offsets of every page needed to cover `[0, total)`.
pub fn page_offsets(total: i64, page_size: i64) -> Vec<i64> {
    if total <= 0 || page_size <= 0 {
        return Vec::new();
    }
    (0..total).step_by(page_size as usize).collect()
}

/// Holds the first error of a run; later errors are logged and dropped.
#[derive(Default)]
struct ErrorSlot {
    failed: AtomicBool,
    error: Mutex<Option<Error>>,
}

impl ErrorSlot {
    async fn record(&self, error: Error) {
        if self.failed.swap(true, Ordering::SeqCst) {
            debug!(error = %error, "Discarding error after first failure");
            return;
        }
        warn!(error = %error, "Pipeline task failed");
        *self.error.lock().await = Some(error);
    }

    fn is_set(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    async fn take(&self) -> Option<Error> {
        self.error.lock().await.take()
    }
}

/// Resolves once the shutdown flag is raised; never resolves if the sender
/// is gone without raising it.
async fn cancelled(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn cancellation_error() -> Error {
    Error::Cancelled("ingestion run interrupted by shutdown".to_string())
}

/// Fetches every page matching a filter set and normalizes its patents.
pub struct IngestionPipeline {
    provider: Arc<dyn PatentProvider>,
    extractor: PatentExtractor,
    config: PipelineConfig,
}

impl IngestionPipeline {
    pub fn new(
        provider: Arc<dyn PatentProvider>,
        extractor: PatentExtractor,
        config: PipelineConfig,
    ) -> Self {
        Self {
            provider,
            extractor,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline to completion.
    ///
    /// Returns every normalized record, in no particular order, or the first
    /// error any stage produced. Raising `shutdown` fails the run with
    /// [`Error::Cancelled`].
    pub async fn run(
        &self,
        filters: &FilterSet,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Vec<PatentRecord>> {
        let start = Instant::now();
        debug!(
            subsystem = "jobs",
            component = "pipeline",
            stage = %PipelineStage::Started,
            filter_count = filters.filters.len(),
            "Ingestion run started"
        );

        if *shutdown.borrow() {
            return Err(cancellation_error());
        }

        let statistics = tokio::select! {
            _ = cancelled(shutdown.clone()) => return Err(cancellation_error()),
            result = self.provider.statistics(filters) => result,
        };
        let statistics = match statistics {
            Ok(statistics) => statistics,
            Err(e) => {
                warn!(
                    subsystem = "jobs",
                    component = "pipeline",
                    stage = %PipelineStage::Failed,
                    error = %e,
                    "Statistics call failed"
                );
                return Err(e);
            }
        };

        let offsets = page_offsets(statistics.total_found, self.config.page_size);
        debug!(
            subsystem = "jobs",
            component = "pipeline",
            stage = %PipelineStage::Fetching,
            total_found = statistics.total_found,
            page_count = offsets.len(),
            "Fetching pages"
        );

        let records = self.fetch_and_parse(filters, offsets, shutdown).await;

        match records {
            Ok(records) => {
                info!(
                    subsystem = "jobs",
                    component = "pipeline",
                    stage = %PipelineStage::Done,
                    total_found = statistics.total_found,
                    result_count = records.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Ingestion run completed"
                );
                Ok(records)
            }
            Err(e) => {
                warn!(
                    subsystem = "jobs",
                    component = "pipeline",
                    stage = %PipelineStage::Failed,
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Ingestion run failed"
                );
                Err(e)
            }
        }
    }

    async fn fetch_and_parse(
        &self,
        filters: &FilterSet,
        offsets: Vec<i64>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Vec<PatentRecord>> {
        let capacity = self.config.queue_capacity.max(1);
        let (offset_tx, offset_rx) = mpsc::channel::<i64>(capacity);
        let (page_tx, page_rx) = mpsc::channel::<RawPage>(capacity);
        let offset_rx = Arc::new(Mutex::new(offset_rx));
        let page_rx = Arc::new(Mutex::new(page_rx));

        let errors = Arc::new(ErrorSlot::default());
        let results = Arc::new(Mutex::new(Vec::new()));
        let filters = Arc::new(filters.clone());
        let mut tasks = JoinSet::new();

        tasks.spawn(dispatch(offsets, offset_tx, errors.clone(), shutdown.clone()));

        for worker in 0..self.config.fetch_workers {
            tasks.spawn(fetch_worker(FetchContext {
                worker,
                provider: self.provider.clone(),
                filters: filters.clone(),
                page_size: self.config.page_size,
                offsets: offset_rx.clone(),
                pages: page_tx.clone(),
                errors: errors.clone(),
                shutdown: shutdown.clone(),
            }));
        }
        // Parse workers see the queue close once every fetcher has exited, and
        // the dispatcher's sends fail once every fetcher has dropped out.
        drop(page_tx);
        drop(offset_rx);

        for worker in 0..self.config.parse_workers {
            tasks.spawn(parse_worker(
                worker,
                self.extractor.clone(),
                page_rx.clone(),
                results.clone(),
                errors.clone(),
            ));
        }
        drop(page_rx);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                errors
                    .record(Error::Internal(format!("pipeline task aborted: {}", e)))
                    .await;
            }
        }

        debug!(
            subsystem = "jobs",
            component = "pipeline",
            stage = %PipelineStage::Aggregating,
            "All pipeline tasks finished"
        );

        if let Some(error) = errors.take().await {
            return Err(error);
        }
        let records = std::mem::take(&mut *results.lock().await);
        Ok(records)
    }
}

async fn dispatch(
    offsets: Vec<i64>,
    offset_tx: mpsc::Sender<i64>,
    errors: Arc<ErrorSlot>,
    shutdown: watch::Receiver<bool>,
) {
    for offset in offsets {
        if errors.is_set() {
            debug!("Stopping page dispatch after failure");
            break;
        }
        tokio::select! {
            _ = cancelled(shutdown.clone()) => {
                errors.record(cancellation_error()).await;
                break;
            }
            sent = offset_tx.send(offset) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}

struct FetchContext {
    worker: usize,
    provider: Arc<dyn PatentProvider>,
    filters: Arc<FilterSet>,
    page_size: i64,
    offsets: Arc<Mutex<mpsc::Receiver<i64>>>,
    pages: mpsc::Sender<RawPage>,
    errors: Arc<ErrorSlot>,
    shutdown: watch::Receiver<bool>,
}

async fn fetch_worker(ctx: FetchContext) {
    loop {
        let next = {
            let mut offsets = ctx.offsets.lock().await;
            tokio::select! {
                _ = cancelled(ctx.shutdown.clone()) => {
                    ctx.errors.record(cancellation_error()).await;
                    return;
                }
                next = offsets.recv() => next,
            }
        };
        let Some(offset) = next else {
            return;
        };
        if ctx.errors.is_set() {
            continue;
        }

        trace!(worker = ctx.worker, page_offset = offset, "Fetching page");
        let page = tokio::select! {
            _ = cancelled(ctx.shutdown.clone()) => {
                ctx.errors.record(cancellation_error()).await;
                return;
            }
            page = ctx.provider.search(&ctx.filters, offset, ctx.page_size) => page,
        };

        match page {
            Ok(page) => {
                if ctx.pages.send(page).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                ctx.errors.record(e).await;
                return;
            }
        }
    }
}

async fn parse_worker(
    worker: usize,
    extractor: PatentExtractor,
    pages: Arc<Mutex<mpsc::Receiver<RawPage>>>,
    results: Arc<Mutex<Vec<PatentRecord>>>,
    errors: Arc<ErrorSlot>,
) {
    loop {
        let page = pages.lock().await.recv().await;
        let Some(page) = page else {
            return;
        };
        // Keep draining after a failure so blocked fetchers can exit.
        if errors.is_set() {
            continue;
        }
        match extractor.extract_page(page) {
            Ok(records) => {
                trace!(worker, result_count = records.len(), "Parsed page");
                results.lock().await.extend(records);
            }
            Err(e) => errors.record(e).await,
        }
    }
}
