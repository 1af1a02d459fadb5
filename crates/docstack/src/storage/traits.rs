//! Local index store traits.
//!
//! `IndexStore` is the narrow synchronous I/O surface implemented by concrete
//! stores (SQLite, in-memory). Every method is one transaction; the store is
//! responsible for serialising conflicting writers. `StoreFactory` opens a
//! store by name, asynchronously, creating the table and its ordering index on
//! first use.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::CacheConfig;
use crate::error::Result;
use crate::types::{CacheEntity, Timestamp};

/// Range over the ordering index `(parent, last_update, id)`: every row of
/// one `parent` whose `last_update` is strictly greater than `after`.
///
/// All rows at a given `last_update` share its fate, so ties are never split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange<'a> {
    pub parent: &'a str,
    pub after: Option<Timestamp>,
}

impl<'a> KeyRange<'a> {
    pub fn new(parent: &'a str, after: Option<Timestamp>) -> Self {
        Self { parent, after }
    }

    /// Smallest `last_update` inside the range, or `None` when the range is
    /// empty (`after == Timestamp::MAX`).
    pub fn first_included(&self) -> Option<Timestamp> {
        match self.after {
            None => Some(Timestamp::MIN),
            Some(after) => after.checked_add(1),
        }
    }

    pub fn contains(&self, parent: &str, last_update: Timestamp) -> bool {
        parent == self.parent && self.after.map_or(true, |after| last_update > after)
    }
}

/// Persistent key-indexed table of [`CacheEntity`] rows.
///
/// Primary key `(parent, doc.id)`: writes are upserts. Scans come back ordered
/// by `(last_update, doc.id)` ascending.
pub trait IndexStore: Send + Sync {
    /// Insert or replace one row.
    fn put(&self, entity: &CacheEntity) -> Result<()>;

    /// Insert or replace many rows in a single transaction.
    fn bulk_put(&self, entities: &[CacheEntity]) -> Result<()>;

    /// Remove every row.
    fn clear(&self) -> Result<()>;

    /// Ordered range read over the `(parent, last_update, id)` index.
    fn scan(&self, range: &KeyRange<'_>) -> Result<Vec<CacheEntity>>;

    /// Point read by primary key.
    fn get(&self, parent: &str, id: &str) -> Result<Option<CacheEntity>>;

    /// Number of rows stored under `parent`.
    fn count(&self, parent: &str) -> Result<usize>;
}

/// Opens an [`IndexStore`] for a cache configuration.
#[async_trait]
pub trait StoreFactory: Send + Sync {
    async fn open(&self, config: &CacheConfig) -> Result<Arc<dyn IndexStore>>;
}

#[async_trait]
impl<F: StoreFactory + ?Sized> StoreFactory for Arc<F> {
    async fn open(&self, config: &CacheConfig) -> Result<Arc<dyn IndexStore>> {
        (**self).open(config).await
    }
}
