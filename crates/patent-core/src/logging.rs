//! Structured logging schema and field name constants for patent-upload.
//!
//! All crates use these names for structured `tracing` fields so that log
//! aggregation can query the same keys across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Job failed or a message could not be settled |
//! | WARN  | Recoverable issue (provider retry, requeue) |
//! | INFO  | Lifecycle events, job and save completions |
//! | DEBUG | Stage transitions, per-page progress |
//! | TRACE | Per-record detail |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "api", "provider", "db", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "gateway", "pipeline", "worker", "broker", "patents"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "search", "statistics", "save", "handle"
pub const OPERATION: &str = "op";

// ─── Job fields ────────────────────────────────────────────────────────────

/// Caller-supplied transaction UUID of an upload job.
pub const TRANSACTION_ID: &str = "transaction_id";

/// Caller-supplied bundle UUID of an upload job.
pub const BUNDLE_ID: &str = "bundle_id";

/// Pipeline stage name (see `PipelineStage`).
pub const STAGE: &str = "stage";

/// Page offset being fetched.
pub const PAGE_OFFSET: &str = "page_offset";

/// Provider call attempt number (1-based).
pub const ATTEMPT: &str = "attempt";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of records produced or written.
pub const RESULT_COUNT: &str = "result_count";

/// Total records reported by the provider.
pub const TOTAL_FOUND: &str = "total_found";

/// Number of pages in a run.
pub const PAGE_COUNT: &str = "page_count";

/// Error message attached to a failed operation.
pub const ERROR_MSG: &str = "error";
