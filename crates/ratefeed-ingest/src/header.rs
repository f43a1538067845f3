//! Header resolution
//!
//! The header is taken from the first line of the source object. It is looked
//! up in the cursor first, then in a cache owned by the process, and only then
//! fetched with a small ranged read.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, instrument};

use crate::error::{IngestError, IngestResult};
use crate::record::HeaderSchema;
use crate::state::StreamCursor;
use crate::storage::BlobStore;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Where a resolved header came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderSource {
    Cursor,
    Memory,
    Object,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHeader {
    pub schema: HeaderSchema,
    /// First byte after the header line, known unless taken from the cursor
    pub data_offset: Option<u64>,
    pub source: HeaderSource,
}

impl ResolvedHeader {
    /// Where data reading should begin for `cursor`
    pub fn start_offset(&self, cursor: &StreamCursor) -> u64 {
        match self.data_offset {
            Some(data_offset) => cursor.byte_offset.max(data_offset),
            None => cursor.byte_offset,
        }
    }
}

pub struct HeaderCache {
    blob: Arc<dyn BlobStore>,
    object: String,
    read_bytes: u64,
    warm: RwLock<HashMap<String, (HeaderSchema, u64)>>,
}

impl HeaderCache {
    pub fn new(blob: Arc<dyn BlobStore>, object: impl Into<String>, read_bytes: u64) -> Self {
        Self {
            blob,
            object: object.into(),
            read_bytes: read_bytes.max(1),
            warm: RwLock::new(HashMap::new()),
        }
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    #[instrument(skip(self, cursor), fields(stream_id = %cursor.stream_id, object = %self.object))]
    pub async fn ensure_header(&self, cursor: &StreamCursor) -> IngestResult<ResolvedHeader> {
        if let Some(line) = &cursor.cached_header {
            let schema = HeaderSchema::parse(line).map_err(|reason| self.header_error(reason))?;
            return Ok(ResolvedHeader {
                schema,
                data_offset: None,
                source: HeaderSource::Cursor,
            });
        }

        if let Some((schema, data_offset)) = self.warm_lookup() {
            debug!("Header served from process cache");
            return Ok(ResolvedHeader {
                schema,
                data_offset: Some(data_offset),
                source: HeaderSource::Memory,
            });
        }

        let bytes = self
            .blob
            .get_range(&self.object, 0, self.read_bytes - 1)
            .await
            .map_err(|err| IngestError::SourceUnavailable {
                object: self.object.clone(),
                byte_offset: 0,
                reason: format!("{:#}", err),
            })?;

        let (schema, data_offset) = parse_header_window(&bytes).map_err(|reason| self.header_error(reason))?;
        info!(fields = schema.len(), data_offset, "Header resolved from source object");

        if let Ok(mut warm) = self.warm.write() {
            warm.insert(self.object.clone(), (schema.clone(), data_offset));
        }

        Ok(ResolvedHeader {
            schema,
            data_offset: Some(data_offset),
            source: HeaderSource::Object,
        })
    }

    fn warm_lookup(&self) -> Option<(HeaderSchema, u64)> {
        self.warm.read().ok()?.get(&self.object).cloned()
    }

    fn header_error(&self, reason: String) -> IngestError {
        IngestError::Header {
            object: self.object.clone(),
            reason,
        }
    }
}

/// Extract the header from the first bytes of the object
///
/// Returns the schema and the offset of the first data byte.
pub fn parse_header_window(bytes: &[u8]) -> Result<(HeaderSchema, u64), String> {
    if bytes.is_empty() {
        return Err("source object is empty".to_string());
    }

    let bom_len = if bytes.starts_with(UTF8_BOM) { UTF8_BOM.len() } else { 0 };
    let rest = &bytes[bom_len..];

    let line_len = rest
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| format!("no line terminator within the first {} bytes", bytes.len()))?;

    let line = String::from_utf8_lossy(&rest[..line_len]);
    let schema = HeaderSchema::parse(&line)?;

    Ok((schema, (bom_len + line_len + 1) as u64))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::memory::MemoryBlobStore;

    const OBJECT: &str = "raw/loans.csv";

    fn cache(data: &[u8]) -> (Arc<MemoryBlobStore>, HeaderCache) {
        let blob = Arc::new(MemoryBlobStore::new().with_object(OBJECT, data.to_vec()));
        let cache = HeaderCache::new(blob.clone(), OBJECT, 4096);
        (blob, cache)
    }

    #[test]
    fn test_parse_header_window_offsets() {
        let (schema, offset) = parse_header_window(b"id,amount\n1,2\n").unwrap();
        assert_eq!(schema.fields(), &["id", "amount"]);
        assert_eq!(offset, 10);

        let (schema, offset) = parse_header_window(b"\xEF\xBB\xBFid,amount\r\n1,2\r\n").unwrap();
        assert_eq!(schema.fields(), &["id", "amount"]);
        assert_eq!(offset, 3 + 10 + 1);
    }

    #[test]
    fn test_parse_header_window_rejects_unterminated() {
        assert!(parse_header_window(b"id,amount").is_err());
        assert!(parse_header_window(b"").is_err());
    }

    #[tokio::test]
    async fn test_cached_header_needs_no_io() {
        let (blob, cache) = cache(b"id,amount\n");
        let mut cursor = StreamCursor::new("s");
        cursor.cached_header = Some("colA,colB".to_string());
        cursor.byte_offset = 300;

        let first = cache.ensure_header(&cursor).await.unwrap();
        let second = cache.ensure_header(&cursor).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.source, HeaderSource::Cursor);
        assert_eq!(first.start_offset(&cursor), 300);
        assert_eq!(blob.read_count(), 0);
    }

    #[tokio::test]
    async fn test_fresh_header_is_fetched_once_per_process() {
        let (blob, cache) = cache(b"id,amount\n1,2\n");
        let cursor = StreamCursor::new("s");

        let first = cache.ensure_header(&cursor).await.unwrap();
        assert_eq!(first.source, HeaderSource::Object);
        assert_eq!(first.start_offset(&cursor), 10);
        assert_eq!(blob.reads(), vec![(0, 4095)]);

        let second = cache.ensure_header(&cursor).await.unwrap();
        assert_eq!(second.source, HeaderSource::Memory);
        assert_eq!(second.schema, first.schema);
        assert_eq!(blob.read_count(), 1);
    }

    #[tokio::test]
    async fn test_read_failure_is_source_unavailable() {
        let (blob, cache) = cache(b"id,amount\n");
        blob.fail_next_read("connection reset");

        let err = cache.ensure_header(&StreamCursor::new("s")).await.unwrap_err();
        assert!(matches!(err, IngestError::SourceUnavailable { byte_offset: 0, .. }));
    }

    #[tokio::test]
    async fn test_oversized_header_is_rejected() {
        let blob = Arc::new(MemoryBlobStore::new().with_object(OBJECT, b"aaaaaaaaaa,bbbbbbbbbb\n".to_vec()));
        let cache = HeaderCache::new(blob, OBJECT, 8);

        let err = cache.ensure_header(&StreamCursor::new("s")).await.unwrap_err();
        assert_eq!(err.kind(), "header");
    }
}
