//! Message handlers run by the upload worker.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{info, instrument};

use patent_core::{translate, Error, PatentStore, Result, ReturnFields, UploadJob};

use crate::pipeline::IngestionPipeline;

/// Turns one inbound message body into the body of its completion message.
///
/// An `Err` means the message was not processed and should be redelivered.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8], shutdown: watch::Receiver<bool>) -> Result<Vec<u8>>;
}

/// Decodes an [`UploadJob`], ingests every matching patent and persists them.
pub struct UploadHandler {
    pipeline: Arc<IngestionPipeline>,
    store: Arc<dyn PatentStore>,
}

impl UploadHandler {
    pub fn new(pipeline: Arc<IngestionPipeline>, store: Arc<dyn PatentStore>) -> Self {
        Self { pipeline, store }
    }

    fn decode(payload: &[u8]) -> Result<UploadJob> {
        serde_json::from_slice(payload)
            .map_err(|e| Error::InvalidInput(format!("undecodable upload job: {}", e)))
    }
}

#[async_trait]
impl MessageHandler for UploadHandler {
    #[instrument(
        skip(self, payload, shutdown),
        fields(subsystem = "jobs", component = "handler", op = "handle")
    )]
    async fn handle(&self, payload: &[u8], shutdown: watch::Receiver<bool>) -> Result<Vec<u8>> {
        let start = Instant::now();
        let job = Self::decode(payload)?;
        // Pagination only shapes the preview search; an upload takes every match.
        let mut filters = job.filters.clone();
        filters.limit = None;
        filters.offset = None;
        let translated = translate(&filters)?;
        let filters = translated.filter_set(ReturnFields::All);

        info!(
            transaction_id = %job.transaction_id,
            bundle_id = %job.bundle_id,
            filter_count = filters.filters.len(),
            "Upload job started"
        );

        let records = self.pipeline.run(&filters, shutdown).await?;
        self.store
            .save(&records, job.transaction_id, job.bundle_id)
            .await?;

        info!(
            transaction_id = %job.transaction_id,
            bundle_id = %job.bundle_id,
            result_count = records.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Upload job completed"
        );

        Ok(serde_json::to_vec(&job.completed())?)
    }
}
