//! Shared fixtures for ratefeed-ingest integration tests
//!
//! [`Harness`] wires an orchestrator to in-memory backends and keeps handles
//! to them so tests can inspect calls and inject failures.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use ratefeed_ingest::{
    config::EngineConfig,
    memory::{MemoryBlobStore, MemoryCursorStore, MemoryQueue},
    orchestrator::IngestOrchestrator,
    scheduler::{RateScheduler, TrafficProfile},
    state::CursorStore,
    StreamCursor,
};
use std::sync::Arc;

pub const OBJECT: &str = "raw/loans.csv";
pub const QUEUE: &str = "https://sqs.local/000000000000/loans";
pub const STREAM: &str = "loans";

pub struct Harness {
    pub blob: Arc<MemoryBlobStore>,
    pub cursors: Arc<MemoryCursorStore>,
    pub queue: Arc<MemoryQueue>,
    pub orchestrator: IngestOrchestrator,
}

impl Harness {
    /// Orchestrator with default sizing and a jitter factor fixed at 1.0
    pub fn new(data: &[u8]) -> Self {
        Self::with_config(data, engine_config())
    }

    pub fn with_config(data: &[u8], config: EngineConfig) -> Self {
        let blob = Arc::new(MemoryBlobStore::new().with_object(OBJECT, data.to_vec()));
        let cursors = Arc::new(MemoryCursorStore::new());
        Self::build(blob, cursors.clone(), cursors, config)
    }

    /// Harness whose orchestrator talks to `store` instead of the in-memory cursors
    pub fn with_cursor_store(data: &[u8], store: Arc<dyn CursorStore>) -> Self {
        let blob = Arc::new(MemoryBlobStore::new().with_object(OBJECT, data.to_vec()));
        Self::build(blob, Arc::new(MemoryCursorStore::new()), store, engine_config())
    }

    fn build(
        blob: Arc<MemoryBlobStore>,
        cursors: Arc<MemoryCursorStore>,
        store: Arc<dyn CursorStore>,
        config: EngineConfig,
    ) -> Self {
        let queue = Arc::new(MemoryQueue::new());
        let orchestrator = IngestOrchestrator::new(
            config,
            RateScheduler::fixed(TrafficProfile::default(), 1.0),
            blob.clone(),
            store,
            queue.clone(),
        )
        .expect("engine config should be valid");

        Self {
            blob,
            cursors,
            queue,
            orchestrator,
        }
    }

    pub fn cursor(&self) -> StreamCursor {
        self.cursors.cursor(STREAM).expect("cursor should have been saved")
    }
}

pub fn engine_config() -> EngineConfig {
    EngineConfig::new(STREAM, OBJECT, QUEUE)
}

/// CSV object with a `id,name,amount` header and `rows` data lines
pub fn loans_csv(rows: usize) -> Vec<u8> {
    let mut csv = String::from("id,name,amount\n");
    for i in 0..rows {
        csv.push_str(&loan_row(i));
        csv.push('\n');
    }
    csv.into_bytes()
}

pub fn loan_row(i: usize) -> String {
    format!("{},borrower-{},{}", i, "x".repeat(i % 5), i * 250)
}

/// Cursor that already knows the header
pub fn cursor_at(byte_offset: u64, carry: &str, header: &str) -> StreamCursor {
    let mut cursor = StreamCursor::new(STREAM);
    cursor.byte_offset = byte_offset;
    cursor.partial_line_carry = carry.to_string();
    cursor.cached_header = Some(header.to_string());
    cursor
}
