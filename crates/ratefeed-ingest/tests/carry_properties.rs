//! Property tests for chunk-boundary handling
//!
//! However the object is cut into ranges, gluing each carry to the next chunk
//! must rebuild every line exactly once.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use ratefeed_ingest::{memory::MemoryBlobStore, reader::ChunkReader, HeaderSchema};
use std::sync::Arc;

const OBJECT: &str = "stream.csv";
const HEADER: &str = "payload\n";

fn line_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-zA-Z0-9 é€😀]{0,40}"
}

fn reader(data: Vec<u8>) -> ChunkReader {
    ChunkReader::new(Arc::new(MemoryBlobStore::new().with_object(OBJECT, data)), OBJECT)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().build().unwrap()
}

proptest! {
    #[test]
    fn carry_plus_next_chunk_rebuilds_the_line(line in "[a-z][a-zA-Z0-9 é€😀]{8,40}", cut in 0usize..200) {
        let data = format!("{}{}\n", HEADER, line).into_bytes();
        // Somewhere inside the line, never reaching its terminator
        let cut = (4 + cut % (line.len() - 4)) as u64;
        let header = HeaderSchema::parse("payload").unwrap();
        let reader = reader(data.clone());
        let start = HEADER.len() as u64;

        runtime().block_on(async {
            let first = reader.read_chunk(start, "", 1, cut, &header).await;
            prop_assert!(first.records.is_empty());
            prop_assert!(first.new_offset <= start + cut);
            prop_assert!(!first.new_carry.contains('\n'));

            let remaining = &data[first.new_offset as usize..];
            let mut glued = first.new_carry.clone().into_bytes();
            glued.extend_from_slice(remaining);
            prop_assert_eq!(glued, format!("{}\n", line).into_bytes());

            let second = reader
                .read_chunk(first.new_offset, &first.new_carry, 1, 4096, &header)
                .await;
            prop_assert_eq!(second.records.len(), 1);
            prop_assert_eq!(second.records[0].get("payload"), Some(line.as_str()));
            prop_assert_eq!(second.new_offset, data.len() as u64);
            prop_assert_eq!(second.new_carry.as_str(), "");
            Ok(())
        })?;
    }

    #[test]
    fn any_chunking_delivers_every_line_once(
        lines in prop::collection::vec(line_strategy(), 1..20),
        chunk in 1u64..48,
        per_call in 1usize..5,
    ) {
        let mut data = HEADER.as_bytes().to_vec();
        for line in &lines {
            data.extend_from_slice(line.as_bytes());
            data.push(b'\n');
        }
        let header = HeaderSchema::parse("payload").unwrap();
        let reader = reader(data.clone());

        runtime().block_on(async {
            let mut offset = HEADER.len() as u64;
            let mut carry = String::new();
            let mut seen = Vec::new();

            while offset < data.len() as u64 {
                let read = reader.read_chunk(offset, &carry, per_call, chunk, &header).await;
                prop_assert!(read.new_offset > offset || !read.records.is_empty());
                prop_assert!(read.records.len() <= per_call);
                seen.extend(read.records.iter().map(|r| r.get("payload").unwrap().to_string()));
                offset = read.new_offset;
                carry = read.new_carry;
            }

            prop_assert_eq!(carry.as_str(), "");
            prop_assert_eq!(seen, lines.clone());
            Ok(())
        })?;
    }
}
