//! Destination queue seam

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod sqs;

pub use sqs::{QueueConfig, SqsQueue};

/// Largest batch a single send call accepts
pub const MAX_BATCH_SIZE: usize = 10;

/// One message in a batch send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Identifier unique within its batch
    pub id: String,
    pub body: String,
}

/// Per-entry result of a batch send
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub failed_ids: Vec<String>,
}

#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Send up to [`MAX_BATCH_SIZE`] entries in one call
    ///
    /// `Err` means the whole call failed; entries rejected individually are
    /// listed in [`BatchOutcome::failed_ids`].
    async fn send_batch(&self, destination: &str, entries: Vec<QueueEntry>) -> Result<BatchOutcome>;
}
