//! In-process backends
//!
//! Implementations of [`BlobStore`], [`CursorStore`] and [`QueueClient`] that
//! keep everything in memory. They count calls and accept injected failures,
//! which makes them the backends of choice for tests and dry runs.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::queue::{BatchOutcome, QueueClient, QueueEntry};
use crate::state::{CursorStore, PutOutcome, StreamCursor};
use crate::storage::BlobStore;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    reads: Mutex<Vec<(u64, u64)>>,
    fail_next: Mutex<Option<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, object: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.put_object(object, data);
        self
    }

    pub fn put_object(&self, object: impl Into<String>, data: impl Into<Vec<u8>>) {
        lock(&self.objects).insert(object.into(), data.into());
    }

    /// Append to an object, creating it if needed
    pub fn append(&self, object: &str, data: &[u8]) {
        lock(&self.objects)
            .entry(object.to_string())
            .or_default()
            .extend_from_slice(data);
    }

    pub fn read_count(&self) -> usize {
        lock(&self.reads).len()
    }

    /// Every requested `(start, end_inclusive)` pair, in call order
    pub fn reads(&self) -> Vec<(u64, u64)> {
        lock(&self.reads).clone()
    }

    pub fn fail_next_read(&self, reason: impl Into<String>) {
        *lock(&self.fail_next) = Some(reason.into());
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get_range(&self, object: &str, start: u64, end_inclusive: u64) -> Result<Vec<u8>> {
        lock(&self.reads).push((start, end_inclusive));

        if let Some(reason) = lock(&self.fail_next).take() {
            bail!(reason);
        }
        if end_inclusive < start {
            bail!("Invalid byte range {}-{} for {}", start, end_inclusive, object);
        }

        let objects = lock(&self.objects);
        let data = objects
            .get(object)
            .ok_or_else(|| anyhow!("No such object: {}", object))?;

        let len = data.len() as u64;
        if start >= len {
            return Ok(Vec::new());
        }
        let end = end_inclusive.min(len - 1);

        Ok(data[start as usize..=end as usize].to_vec())
    }
}

#[derive(Default)]
pub struct MemoryCursorStore {
    cursors: Mutex<HashMap<String, StreamCursor>>,
    gets: AtomicUsize,
    puts: AtomicUsize,
    fail_next_get: Mutex<Option<String>>,
    fail_next_put: Mutex<Option<String>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `cursor` unconditionally, assigning revision 1 if it has none
    pub fn seed(&self, mut cursor: StreamCursor) {
        cursor.revision.get_or_insert(1);
        lock(&self.cursors).insert(cursor.stream_id.clone(), cursor);
    }

    pub fn cursor(&self, stream_id: &str) -> Option<StreamCursor> {
        lock(&self.cursors).get(stream_id).cloned()
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn fail_next_get(&self, reason: impl Into<String>) {
        *lock(&self.fail_next_get) = Some(reason.into());
    }

    pub fn fail_next_put(&self, reason: impl Into<String>) {
        *lock(&self.fail_next_put) = Some(reason.into());
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn get(&self, stream_id: &str) -> Result<Option<StreamCursor>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = lock(&self.fail_next_get).take() {
            bail!(reason);
        }
        Ok(self.cursor(stream_id))
    }

    async fn put(&self, cursor: &StreamCursor, expected_revision: Option<u64>) -> Result<PutOutcome> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = lock(&self.fail_next_put).take() {
            bail!(reason);
        }

        let mut cursors = lock(&self.cursors);
        let stored = cursors.get(&cursor.stream_id);

        let next_revision = match (expected_revision, stored) {
            (None, None) => 1,
            (Some(expected), Some(stored))
                if stored.revision == Some(expected) && stored.byte_offset <= cursor.byte_offset =>
            {
                expected + 1
            },
            _ => return Ok(PutOutcome::Conflict),
        };

        let mut cursor = cursor.clone();
        cursor.revision = Some(next_revision);
        cursors.insert(cursor.stream_id.clone(), cursor);

        Ok(PutOutcome::Committed)
    }
}

enum Scripted {
    Reject(Vec<String>),
    Fail(String),
}

/// Queue that records accepted messages per destination
#[derive(Default)]
pub struct MemoryQueue {
    accepted: Mutex<Vec<(String, QueueEntry)>>,
    calls: AtomicUsize,
    script: Mutex<VecDeque<Scripted>>,
    fail_always: Mutex<Option<String>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next batch call reports these entry ids as failed
    pub fn reject_next(&self, ids: &[&str]) {
        lock(&self.script).push_back(Scripted::Reject(ids.iter().map(|s| s.to_string()).collect()));
    }

    /// The next batch call fails outright
    pub fn fail_next(&self, reason: impl Into<String>) {
        lock(&self.script).push_back(Scripted::Fail(reason.into()));
    }

    pub fn fail_all(&self, reason: impl Into<String>) {
        *lock(&self.fail_always) = Some(reason.into());
    }

    pub fn batch_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Bodies of accepted messages, in send order
    pub fn bodies(&self) -> Vec<String> {
        lock(&self.accepted)
            .iter()
            .map(|(_, entry)| entry.body.clone())
            .collect()
    }

    pub fn accepted(&self) -> Vec<(String, QueueEntry)> {
        lock(&self.accepted).clone()
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn send_batch(&self, destination: &str, entries: Vec<QueueEntry>) -> Result<BatchOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(reason) = lock(&self.fail_always).clone() {
            bail!(reason);
        }

        let failed_ids = match lock(&self.script).pop_front() {
            Some(Scripted::Fail(reason)) => bail!(reason),
            Some(Scripted::Reject(ids)) => ids,
            None => Vec::new(),
        };

        let mut accepted = lock(&self.accepted);
        for entry in entries {
            if !failed_ids.contains(&entry.id) {
                accepted.push((destination.to_string(), entry));
            }
        }

        Ok(BatchOutcome { failed_ids })
    }
}
