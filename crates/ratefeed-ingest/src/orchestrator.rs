//! One ingestion invocation, end to end
//!
//! compute target -> load cursor -> resolve header -> read chunk -> dispatch
//! -> save cursor. A target of zero exits before any I/O. Header and read
//! failures abort before the cursor is touched. Dispatch failures never
//! abort: the cursor advances by bytes consumed, not by delivery.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::EngineConfig;
use crate::dispatch::Dispatcher;
use crate::error::{IngestError, IngestResult};
use crate::header::HeaderCache;
use crate::queue::QueueClient;
use crate::reader::{chunk_size, ChunkReader};
use crate::scheduler::RateScheduler;
use crate::state::{CursorStore, CursorUpdate, PutOutcome, StatePersistence};
use crate::storage::BlobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Target was zero; nothing was read or written
    Idle,
    Committed,
    /// Another invocation saved first; this one's progress was discarded
    Conflict,
}

/// Summary of one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationReport {
    pub stream_id: String,
    pub target: u64,
    pub records_read: usize,
    pub malformed: usize,
    pub sent: usize,
    pub failed: usize,
    /// Offset written to the cursor; `None` when nothing was saved
    pub byte_offset: Option<u64>,
    pub outcome: Outcome,
}

impl InvocationReport {
    fn idle(stream_id: &str) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            target: 0,
            records_read: 0,
            malformed: 0,
            sent: 0,
            failed: 0,
            byte_offset: None,
            outcome: Outcome::Idle,
        }
    }
}

pub struct IngestOrchestrator {
    config: EngineConfig,
    scheduler: RateScheduler,
    state: StatePersistence,
    headers: HeaderCache,
    reader: ChunkReader,
    dispatcher: Dispatcher,
}

impl IngestOrchestrator {
    /// Wire the components together; fails on an invalid `config`
    pub fn new(
        config: EngineConfig,
        scheduler: RateScheduler,
        blob: Arc<dyn BlobStore>,
        cursors: Arc<dyn CursorStore>,
        queue: Arc<dyn QueueClient>,
    ) -> IngestResult<Self> {
        config.validate()?;

        let headers = HeaderCache::new(blob.clone(), config.source_key.clone(), config.header_read_bytes);
        let reader = ChunkReader::new(blob, config.source_key.clone());
        let dispatcher = Dispatcher::new(queue, config.batch_size);

        Ok(Self {
            state: StatePersistence::new(cursors),
            scheduler,
            headers,
            reader,
            dispatcher,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &RateScheduler {
        &self.scheduler
    }

    /// Run one invocation for the window containing `now`
    pub async fn run_once(&self, now: DateTime<Utc>) -> IngestResult<InvocationReport> {
        let target = self.scheduler.target_at(now, self.config.daily_target);
        self.run_with_target(target).await
    }

    /// Run one invocation with an already computed target
    #[instrument(
        skip(self),
        fields(stream_id = %self.config.stream_id, invocation_id = %uuid::Uuid::new_v4())
    )]
    pub async fn run_with_target(&self, target: u64) -> IngestResult<InvocationReport> {
        let stream_id = self.config.stream_id.as_str();

        if target == 0 {
            info!(target_count = target, "Nothing to release in this window");
            return Ok(InvocationReport::idle(stream_id));
        }

        let cursor = self.state.load(stream_id).await?;
        let header = self.headers.ensure_header(&cursor).await?;
        let start = header.start_offset(&cursor);

        let chunk_bytes = chunk_size(
            target,
            self.config.avg_bytes_per_record,
            self.config.min_chunk_bytes,
            self.config.max_chunk_bytes,
        );
        let count_needed = usize::try_from(target).unwrap_or(usize::MAX);

        let read = self
            .reader
            .read_chunk(start, &cursor.partial_line_carry, count_needed, chunk_bytes, &header.schema)
            .await;

        if let Some(reason) = read.failure {
            return Err(IngestError::SourceUnavailable {
                object: self.config.source_key.clone(),
                byte_offset: start,
                reason,
            });
        }

        if read.malformed > 0 {
            info!(byte_offset = start, malformed = read.malformed, "Dropped malformed rows");
        }

        let dispatch = self.dispatcher.send(&self.config.queue_url, &read.records).await;
        if dispatch.sent == 0 && !read.records.is_empty() {
            warn!(
                byte_offset = start,
                records = read.records.len(),
                "No records delivered; cursor still advances"
            );
        }

        let update = CursorUpdate {
            byte_offset: read.new_offset,
            last_record_index: cursor.last_record_index + dispatch.sent as i64,
            partial_line_carry: read.new_carry,
            header: Some(header.schema.line().to_string()),
        };
        let byte_offset = update.byte_offset;

        let outcome = match self.state.save(&cursor, update).await? {
            PutOutcome::Committed => Outcome::Committed,
            PutOutcome::Conflict => Outcome::Conflict,
        };

        info!(
            target_count = target,
            records_read = read.records.len(),
            sent = dispatch.sent,
            byte_offset,
            ?outcome,
            "Invocation finished"
        );

        Ok(InvocationReport {
            stream_id: stream_id.to_string(),
            target,
            records_read: read.records.len(),
            malformed: read.malformed,
            sent: dispatch.sent,
            failed: dispatch.failed,
            byte_offset: (outcome == Outcome::Committed).then_some(byte_offset),
            outcome,
        })
    }
}
