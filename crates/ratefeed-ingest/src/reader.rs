//! Resumable chunk reading
//!
//! Each call fetches one bounded byte range, glues the carried partial line in
//! front of it and parses complete lines against the header. The returned
//! offset only moves past bytes whose lines were returned or discarded, so
//! stopping early at `count_needed` never loses a record. An incomplete last
//! line becomes the new carry.

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::record::{HeaderSchema, RawRecord};
use crate::storage::BlobStore;

/// Inflation applied to the byte estimate to absorb row-size variance
const SIZE_HEADROOM_NUM: u64 = 6;
const SIZE_HEADROOM_DEN: u64 = 5;

/// Smallest range worth requesting: always holds one complete UTF-8 character
const MIN_READ_BYTES: u64 = 4;

/// Bytes to request for `count` records: `count * avg * 1.2`, clamped
pub fn chunk_size(count: u64, avg_bytes_per_record: u64, min_bytes: u64, max_bytes: u64) -> u64 {
    let estimate = count
        .saturating_mul(avg_bytes_per_record)
        .saturating_mul(SIZE_HEADROOM_NUM)
        .div_ceil(SIZE_HEADROOM_DEN);
    estimate.max(min_bytes).min(max_bytes)
}

/// Outcome of one chunk read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkRead {
    pub records: Vec<RawRecord>,
    pub new_offset: u64,
    pub new_carry: String,
    /// Complete lines dropped for a column-count mismatch
    pub malformed: usize,
    /// Bytes returned by the blob store
    pub fetched: usize,
    /// Set when the range read failed; offset and carry are then unchanged
    pub failure: Option<String>,
}

impl ChunkRead {
    fn unchanged(start: u64, carry: &str) -> Self {
        Self {
            new_offset: start,
            new_carry: carry.to_string(),
            ..Self::default()
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

pub struct ChunkReader {
    blob: Arc<dyn BlobStore>,
    object: String,
}

impl ChunkReader {
    pub fn new(blob: Arc<dyn BlobStore>, object: impl Into<String>) -> Self {
        Self {
            blob,
            object: object.into(),
        }
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    /// Read up to `count_needed` records starting at `start`
    ///
    /// Never fails: a read error is reported through [`ChunkRead::failure`]
    /// with the offset and carry left as they were.
    #[instrument(skip(self, carry, header), fields(object = %self.object, carry_len = carry.len()))]
    pub async fn read_chunk(
        &self,
        start: u64,
        carry: &str,
        count_needed: usize,
        chunk_bytes: u64,
        header: &HeaderSchema,
    ) -> ChunkRead {
        if count_needed == 0 {
            return ChunkRead::unchanged(start, carry);
        }

        let end_inclusive = start.saturating_add(chunk_bytes.max(MIN_READ_BYTES) - 1);
        let fetched = match self.blob.get_range(&self.object, start, end_inclusive).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(byte_offset = start, error = %format!("{:#}", err), "Range read failed");
                let mut read = ChunkRead::unchanged(start, carry);
                read.failure = Some(format!("{:#}", err));
                return read;
            },
        };

        if fetched.is_empty() {
            debug!(byte_offset = start, "No new bytes in source object");
            return ChunkRead::unchanged(start, carry);
        }

        let mut read = scan(start, carry, &fetched, count_needed, header);
        read.fetched = fetched.len();

        debug!(
            byte_offset = start,
            fetched = read.fetched,
            records = read.records.len(),
            malformed = read.malformed,
            new_offset = read.new_offset,
            carry_len = read.new_carry.len(),
            "Chunk scanned"
        );

        read
    }
}

/// Parse `carry + fetched` into at most `count_needed` records
pub(crate) fn scan(
    start: u64,
    carry: &str,
    fetched: &[u8],
    count_needed: usize,
    header: &HeaderSchema,
) -> ChunkRead {
    let mut buffer = Vec::with_capacity(carry.len() + fetched.len());
    buffer.extend_from_slice(carry.as_bytes());
    buffer.extend_from_slice(fetched);

    let mut records = Vec::new();
    let mut malformed = 0;
    let mut line_start = 0;
    let mut stopped_early = false;

    while let Some(len) = buffer[line_start..].iter().position(|&b| b == b'\n') {
        if records.len() >= count_needed {
            stopped_early = true;
            break;
        }

        let mut line = &buffer[line_start..line_start + len];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        line_start += len + 1;

        let text = String::from_utf8_lossy(line);
        if text.trim().is_empty() {
            continue;
        }
        match header.parse_row(&text) {
            Some(record) => records.push(record),
            None => malformed += 1,
        }
    }

    if !stopped_early && records.len() >= count_needed && line_start < buffer.len() {
        // Quota met exactly on the last complete line; leave the tail unread.
        stopped_early = true;
    }

    let (consumed, new_carry) = if stopped_early {
        (line_start, String::new())
    } else {
        let tail = &buffer[line_start..];
        let carry_len = carry_prefix_len(tail);
        let new_carry = String::from_utf8_lossy(&tail[..carry_len]).into_owned();
        (line_start + carry_len, new_carry)
    };

    ChunkRead {
        records,
        new_offset: start + consumed.saturating_sub(carry.len()) as u64,
        new_carry,
        malformed,
        fetched: fetched.len(),
        failure: None,
    }
}

/// Bytes of an unterminated tail that can be kept as carry
///
/// An incomplete UTF-8 sequence at the very end is left unconsumed so it is
/// re-read whole next time, even when invalid bytes precede it. Invalid bytes
/// elsewhere are consumed and decoded lossily.
fn carry_prefix_len(tail: &[u8]) -> usize {
    // A truncated sequence is a lead byte followed by at most two continuation bytes
    for back in 1..=tail.len().min(3) {
        let lead = tail.len() - back;
        if tail[lead] & 0xC0 == 0x80 {
            continue;
        }
        return match std::str::from_utf8(&tail[lead..]) {
            Err(err) if err.valid_up_to() == 0 && err.error_len().is_none() => lead,
            _ => tail.len(),
        };
    }
    tail.len()
}
