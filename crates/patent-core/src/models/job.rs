//! Queue job messages.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::filters::Filters;

/// Inbound upload job. Both identifiers are opaque and echoed on completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadJob {
    #[serde(default)]
    pub filters: Filters,
    pub transaction_id: Uuid,
    pub bundle_id: Uuid,
}

impl UploadJob {
    pub fn completed(&self) -> UploadCompleted {
        UploadCompleted {
            transaction_id: self.transaction_id,
            bundle_id: self.bundle_id,
        }
    }
}

/// Outbound completion message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCompleted {
    pub transaction_id: Uuid,
    pub bundle_id: Uuid,
}
