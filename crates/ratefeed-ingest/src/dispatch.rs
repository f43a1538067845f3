//! Batched queue dispatch

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::queue::{QueueClient, QueueEntry, MAX_BATCH_SIZE};
use crate::record::RawRecord;

/// Totals for one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    pub batches: usize,
    /// Batch calls that failed as a whole
    pub failed_batches: usize,
}

pub struct Dispatcher {
    queue: Arc<dyn QueueClient>,
    batch_size: usize,
}

impl Dispatcher {
    pub fn new(queue: Arc<dyn QueueClient>, batch_size: usize) -> Self {
        Self {
            queue,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Send `records` in batches, returning how many were accepted
    ///
    /// A failed batch counts as zero sent and does not stop later batches.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn send(&self, destination: &str, records: &[RawRecord]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (batch_index, batch) in records.chunks(self.batch_size).enumerate() {
            report.batches += 1;

            let mut entries = Vec::with_capacity(batch.len());
            for (ordinal, record) in batch.iter().enumerate() {
                match record.to_json() {
                    Ok(body) => entries.push(QueueEntry {
                        id: ordinal.to_string(),
                        body,
                    }),
                    Err(err) => {
                        warn!(batch_index, ordinal, error = %err, "Failed to serialize record");
                        report.failed += 1;
                    },
                }
            }
            if entries.is_empty() {
                continue;
            }

            let attempted = entries.len();
            match self.queue.send_batch(destination, entries).await {
                Ok(outcome) => {
                    let failed = outcome.failed_ids.len().min(attempted);
                    if failed > 0 {
                        warn!(batch_index, failed, attempted, "Queue rejected part of a batch");
                    }
                    report.sent += attempted - failed;
                    report.failed += failed;
                },
                Err(err) => {
                    warn!(
                        batch_index,
                        attempted,
                        error = %format!("{:#}", err),
                        "Batch send failed, counting as zero sent"
                    );
                    report.failed += attempted;
                    report.failed_batches += 1;
                },
            }
        }

        debug!(
            sent = report.sent,
            failed = report.failed,
            batches = report.batches,
            "Dispatch finished"
        );

        report
    }
}
