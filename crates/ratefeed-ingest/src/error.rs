//! Ingestion error taxonomy
//!
//! Only failures that abort a cycle are represented here. Malformed rows and
//! throttled queue batches never surface as errors; they are counted in
//! [`crate::reader::ChunkRead`] and [`crate::dispatch::DispatchReport`].

use ratefeed_common::RatefeedError;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type IngestResult<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// A range read against the source object failed
    #[error("Source unavailable: {object} at byte {byte_offset}: {reason}")]
    SourceUnavailable {
        object: String,
        byte_offset: u64,
        reason: String,
    },

    /// The header line could not be derived from the source object
    #[error("Invalid header in {object}: {reason}")]
    Header { object: String, reason: String },

    /// The cursor store failed for a reason other than "not found"
    #[error("State backend error for stream '{stream_id}': {reason}")]
    StateBackend { stream_id: String, reason: String },

    #[error(transparent)]
    Config(#[from] RatefeedError),
}

impl IngestError {
    pub(crate) fn state(stream_id: &str, err: anyhow::Error) -> Self {
        IngestError::StateBackend {
            stream_id: stream_id.to_string(),
            reason: format!("{:#}", err),
        }
    }

    /// Short machine-friendly kind, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::SourceUnavailable { .. } => "source_unavailable",
            IngestError::Header { .. } => "header",
            IngestError::StateBackend { .. } => "state_backend",
            IngestError::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_error_keeps_context_chain() {
        let err = anyhow::anyhow!("connection reset").context("Failed to load cursor");
        let err = IngestError::state("loans", err);
        assert_eq!(err.kind(), "state_backend");
        assert_eq!(
            err.to_string(),
            "State backend error for stream 'loans': Failed to load cursor: connection reset"
        );
    }

    #[test]
    fn test_source_unavailable_message() {
        let err = IngestError::SourceUnavailable {
            object: "raw/loans.csv".to_string(),
            byte_offset: 4096,
            reason: "timeout".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Source unavailable: raw/loans.csv at byte 4096: timeout"
        );
    }
}
