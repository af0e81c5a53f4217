//! Centralized default constants for the patent-upload service.
//!
//! **This module is the single source of truth** for shared default values.
//! Config structs in the other crates fall back to these when the matching
//! environment variable is absent.

// =============================================================================
// FILTERS
// =============================================================================

/// Default number of records returned by the preview search.
pub const FILTER_LIMIT: i64 = 10;

/// Largest `limit` the preview search accepts.
pub const FILTER_MAX_LIMIT: i64 = 100;

/// Default preview page offset.
pub const FILTER_OFFSET: i64 = 0;

/// Records requested per provider call in the preview search.
pub const FILTER_CHUNK_SIZE: i64 = 5;

/// Provider field the free-text query is attached to.
pub const FULLTEXT_FIELD: &str = "fulltext";

/// Provider text fields searched by the free-text query, in emission order.
pub const FULLTEXT_SEARCH_FIELDS: [&str; 4] = [
    "invention_title",
    "descriptions.plain_text",
    "claims.plain_text",
    "abstract_paragraphs.plain_text",
];

/// Return fields requested by the preview search.
pub const PREVIEW_RETURN_FIELDS: [&str; 9] = [
    "legal_status",
    "current_assignee",
    "inventor",
    "titles",
    "current_owner",
    "expiration_date",
    "assignee",
    "priority_claims",
    "app_pub_references",
];

// =============================================================================
// PROVIDER
// =============================================================================

/// Per-call timeout. Full-record pages are large, so this is minutes-scale.
pub const PROVIDER_TIMEOUT_SECS: u64 = 1000;

/// Total attempts per provider call (first try included).
pub const PROVIDER_MAX_ATTEMPTS: u32 = 3;

/// Provider sort field for deterministic paging.
pub const PROVIDER_SORT_FIELD: &str = "docdb_document_number";

/// Provider sort direction.
pub const PROVIDER_SORT_DIRECTION: &str = "asc";

/// Path appended to the provider base URL for rendered patent PDFs.
pub const PROVIDER_PDF_PATH: &str = "patents/pdf";

// =============================================================================
// PIPELINE
// =============================================================================

/// Records per provider page during ingestion.
pub const PAGE_SIZE: i64 = 20;

/// Concurrent fetch workers per ingestion run.
pub const FETCH_WORKERS: usize = 8;

/// Concurrent parse workers per ingestion run.
pub const PARSE_WORKERS: usize = 2;

/// Capacity of the queue between fetch and parse stages.
pub const RAW_PAGE_QUEUE_CAPACITY: usize = 16;

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Records written per batch inside one save transaction.
pub const PERSIST_BATCH_SIZE: usize = 500;

/// PostgreSQL limit on bind parameters in one statement.
pub const PG_MAX_BIND_PARAMS: usize = 65_535;

// =============================================================================
// BROKER / WORKER
// =============================================================================

/// Default broker URL.
pub const BROKER_URL: &str = "redis://localhost:6379";

/// Queue that upload jobs arrive on.
pub const BROKER_CONSUME_QUEUE: &str = "patent:upload";

/// Queue that completion messages are published to.
pub const BROKER_PUBLISH_QUEUE: &str = "patent:upload:done";

/// Maximum unacknowledged deliveries held by one worker.
pub const BROKER_PREFETCH_COUNT: usize = 1;

/// Default consumer identity (names the processing list).
pub const BROKER_CONSUMER_ID: &str = "patent-upload";

/// Seconds a blocking receive waits before re-checking for shutdown.
pub const BROKER_RECEIVE_WAIT_SECS: u64 = 5;

/// Attempts to connect to the broker at startup.
pub const BROKER_CONNECT_ATTEMPTS: u32 = 5;

/// Initial backoff between broker connection attempts (doubled each retry).
pub const BROKER_CONNECT_BACKOFF_MS: u64 = 500;

/// Maximum runtime of one upload job before it is abandoned and requeued.
pub const JOB_TIMEOUT_SECS: u64 = 3600;

/// Capacity of the worker event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// SERVER
// =============================================================================

/// Default database URL.
pub const DATABASE_URL: &str = "postgres://localhost/patents";

/// Default HTTP bind host.
pub const HOST: &str = "0.0.0.0";

/// Default HTTP port.
pub const PORT: u16 = 8080;
