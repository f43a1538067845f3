//! Ratefeed Ingest Library
//!
//! Rate-controlled, resumable ingestion of a large append-only CSV object into
//! a message queue.
//!
//! # Overview
//!
//! Each invocation is stateless and short-lived:
//!
//! - **Scheduling**: [`scheduler::RateScheduler`] turns the wall clock and a
//!   daily target into a record count for the current minute
//! - **Header**: [`header::HeaderCache`] resolves the column names from the
//!   first line of the object, caching them in the cursor and in memory
//! - **Reading**: [`reader::ChunkReader`] fetches one byte range, joins it with
//!   the carried partial line and parses complete rows
//! - **Dispatch**: [`dispatch::Dispatcher`] sends rows as JSON in batches of ten
//! - **State**: [`state::StatePersistence`] loads and conditionally saves the
//!   [`state::StreamCursor`]
//!
//! [`orchestrator::IngestOrchestrator`] runs these steps in order.
//!
//! # Backends
//!
//! Blob storage, cursor storage and the queue sit behind the
//! [`storage::BlobStore`], [`state::CursorStore`] and [`queue::QueueClient`]
//! traits. Production implementations use S3, PostgreSQL and SQS; the
//! [`memory`] module provides in-process versions.
//!
//! # Example
//!
//! ```no_run
//! use ratefeed_ingest::{
//!     config::EngineConfig,
//!     memory::{MemoryBlobStore, MemoryCursorStore, MemoryQueue},
//!     orchestrator::IngestOrchestrator,
//!     scheduler::{RateScheduler, TrafficProfile},
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> ratefeed_ingest::IngestResult<()> {
//! let blob = Arc::new(MemoryBlobStore::new().with_object("loans.csv", b"id,amount\n1,100\n".to_vec()));
//! let orchestrator = IngestOrchestrator::new(
//!     EngineConfig::new("loans", "loans.csv", "loans-queue"),
//!     RateScheduler::new(TrafficProfile::default()),
//!     blob,
//!     Arc::new(MemoryCursorStore::new()),
//!     Arc::new(MemoryQueue::new()),
//! )?;
//! let report = orchestrator.run_once(chrono::Utc::now()).await?;
//! println!("sent {}", report.sent);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod header;
pub mod memory;
pub mod orchestrator;
pub mod queue;
pub mod reader;
pub mod record;
pub mod scheduler;
pub mod state;
pub mod storage;

pub use error::{IngestError, IngestResult};
pub use orchestrator::{IngestOrchestrator, InvocationReport, Outcome};
pub use record::{HeaderSchema, RawRecord};
pub use state::StreamCursor;
