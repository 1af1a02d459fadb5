//! MemoryDatabase: in-process backend implementing [`Database`].
//!
//! Stands in for a remote server: it stamps each write with a strictly
//! increasing `last_update` and answers reads in a single batch.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::storage::{IndexStore, KeyRange, MemoryIndexStore};
use crate::types::{CacheEntity, CollectionPath, Doc, DocResult, OperationCode, Timestamp};

use super::{Database, DocStream};

pub struct MemoryDatabase {
    rows: MemoryIndexStore,
    clock: Mutex<Timestamp>,
    get_calls: AtomicUsize,
    put_calls: AtomicUsize,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            rows: MemoryIndexStore::new(),
            clock: Mutex::new(0),
            get_calls: AtomicUsize::new(0),
            put_calls: AtomicUsize::new(0),
        }
    }

    /// Store `result` as-is, bypassing the clock. The clock is advanced past
    /// its `last_update` so later writes still sort after it.
    pub fn seed(&self, path: &CollectionPath, result: DocResult) -> Result<()> {
        let mut clock = self.clock.lock();
        *clock = (*clock).max(result.last_update);
        self.rows.put(&CacheEntity::new(path.parent(), result))
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Next timestamp: wall-clock milliseconds, bumped when needed so that
    /// stamps never repeat or go backwards below `Timestamp::MAX`.
    fn tick(&self) -> Timestamp {
        let mut clock = self.clock.lock();
        let now = chrono::Utc::now().timestamp_millis();
        *clock = now.max(clock.saturating_add(1));
        *clock
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    fn get_docs(
        &self,
        op: &OperationCode,
        path: &CollectionPath,
        after: Option<Timestamp>,
    ) -> DocStream {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let parent = path.parent();
        match self.rows.scan(&KeyRange::new(&parent, after)) {
            Ok(rows) => {
                tracing::debug!(op = %op, path = %path, count = rows.len(), "memory get_docs");
                DocStream::from_batches(vec![rows
                    .into_iter()
                    .map(CacheEntity::into_result)
                    .collect()])
            }
            Err(e) => DocStream::failed(e),
        }
    }

    async fn put_doc(
        &self,
        op: &OperationCode,
        path: &CollectionPath,
        doc: Doc,
    ) -> Result<DocResult> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let result = DocResult::new(self.tick(), doc);
        self.rows
            .put(&CacheEntity::new(path.parent(), result.clone()))?;
        tracing::debug!(op = %op, path = %path, id = %result.doc.id, last_update = result.last_update, "memory put_doc");
        Ok(result)
    }
}
