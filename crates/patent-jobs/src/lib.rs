//! # patent-jobs
//!
//! Patent ingestion for patent-upload.
//!
//! This crate provides:
//! - [`PatentExtractor`], normalizing raw provider patents (claims included)
//! - [`IngestionPipeline`], fetching and parsing every page of a query concurrently
//! - [`UploadHandler`] and [`UploadWorker`], consuming upload jobs from a broker
//! - [`FilterService`], the synchronous preview search
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use patent_jobs::*;
//!
//! let broker = Arc::new(RedisBroker::connect(BrokerConfig::from_env()).await?);
//! let pipeline = Arc::new(IngestionPipeline::new(
//!     provider.clone(),
//!     PatentExtractor::new(pdf_base_url),
//!     PipelineConfig::from_env(),
//! ));
//! let handler = Arc::new(UploadHandler::new(pipeline, store));
//!
//! let handle = UploadWorker::new(broker, handler, WorkerConfig::from_env()).start();
//! let mut events = handle.events();
//!
//! // Graceful shutdown
//! handle.shutdown().await?;
//! ```

pub mod broker;
pub mod extract;
pub mod handler;
pub mod pipeline;
pub mod preview;
pub mod worker;

pub use broker::{BrokerConfig, Delivery, MessageBroker, RedisBroker};
pub use extract::PatentExtractor;
pub use handler::{MessageHandler, UploadHandler};
pub use pipeline::{IngestionPipeline, PipelineConfig, PipelineStage};
pub use preview::FilterService;
pub use worker::{UploadWorker, WorkerConfig, WorkerEvent, WorkerHandle};
