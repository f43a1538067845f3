//! Cursor persistence
//!
//! A [`StreamCursor`] records how far a stream has been ingested. It is loaded
//! at the start of every invocation and replaced wholesale at the end of a
//! successful one. Writes are conditional on the revision that was loaded, so
//! two overlapping invocations cannot both commit progress from the same
//! starting point.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::error::{IngestError, IngestResult};

pub mod postgres;

pub use postgres::PgCursorStore;

/// Persisted ingestion position for one stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamCursor {
    pub stream_id: String,
    /// Next byte of the source object to fetch
    pub byte_offset: u64,
    /// Index of the last record handed to the queue, -1 before the first one
    pub last_record_index: i64,
    pub cached_header: Option<String>,
    /// Trailing incomplete line of the previous chunk
    pub partial_line_carry: String,
    pub updated_at: Option<DateTime<Utc>>,
    /// Store-assigned version, `None` until the cursor is first saved
    pub revision: Option<u64>,
}

impl StreamCursor {
    /// Cursor for a stream that has never been saved
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            byte_offset: 0,
            last_record_index: -1,
            cached_header: None,
            partial_line_carry: String::new(),
            updated_at: None,
            revision: None,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.revision.is_some()
    }
}

/// Result of a conditional write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PutOutcome {
    Committed,
    /// The stored cursor changed since it was loaded; nothing was written
    Conflict,
}

/// Durable key-value store for cursors
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Fetch a cursor; `Ok(None)` means no cursor exists for `stream_id`
    async fn get(&self, stream_id: &str) -> Result<Option<StreamCursor>>;

    /// Replace the stored cursor
    ///
    /// With `expected_revision = None` the write only succeeds if no cursor
    /// exists yet. Otherwise it only succeeds if the stored revision equals
    /// `expected_revision` and the stored offset does not exceed the new one.
    /// The store assigns the new revision.
    async fn put(&self, cursor: &StreamCursor, expected_revision: Option<u64>) -> Result<PutOutcome>;
}

/// New cursor contents produced by one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorUpdate {
    pub byte_offset: u64,
    pub last_record_index: i64,
    pub partial_line_carry: String,
    pub header: Option<String>,
}

/// Load/save wrapper translating store failures into [`IngestError`]
#[derive(Clone)]
pub struct StatePersistence {
    store: Arc<dyn CursorStore>,
}

impl StatePersistence {
    pub fn new(store: Arc<dyn CursorStore>) -> Self {
        Self { store }
    }

    /// Load the cursor, or a zero cursor if the stream has none yet
    #[instrument(skip(self))]
    pub async fn load(&self, stream_id: &str) -> IngestResult<StreamCursor> {
        match self.store.get(stream_id).await {
            Ok(Some(cursor)) => {
                debug!(
                    byte_offset = cursor.byte_offset,
                    last_record_index = cursor.last_record_index,
                    "Cursor loaded"
                );
                Ok(cursor)
            },
            Ok(None) => {
                debug!("No cursor stored, starting from zero");
                Ok(StreamCursor::new(stream_id))
            },
            Err(err) => Err(IngestError::state(stream_id, err)),
        }
    }

    /// Overwrite the cursor loaded as `loaded` with `update`
    #[instrument(skip(self, loaded, update), fields(stream_id = %loaded.stream_id, byte_offset = update.byte_offset))]
    pub async fn save(&self, loaded: &StreamCursor, update: CursorUpdate) -> IngestResult<PutOutcome> {
        let cursor = StreamCursor {
            stream_id: loaded.stream_id.clone(),
            byte_offset: update.byte_offset,
            last_record_index: update.last_record_index,
            cached_header: update.header,
            partial_line_carry: update.partial_line_carry,
            updated_at: Some(Utc::now()),
            revision: loaded.revision,
        };

        let outcome = self
            .store
            .put(&cursor, loaded.revision)
            .await
            .map_err(|err| IngestError::state(&loaded.stream_id, err))?;

        if outcome == PutOutcome::Conflict {
            warn!(
                loaded_revision = ?loaded.revision,
                "Cursor changed since it was loaded, discarding this invocation's progress"
            );
        }

        Ok(outcome)
    }
}
