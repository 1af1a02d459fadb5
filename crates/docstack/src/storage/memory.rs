//! In-memory index store and a factory that keeps named stores alive across
//! opens, so a "reopened" cache sees the rows written before.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::cache::CacheConfig;
use crate::error::{DocStoreError, Result};
use crate::types::{CacheEntity, Doc, Timestamp};

use super::traits::{IndexStore, KeyRange, StoreFactory};

// ============================================================================
// MemoryIndexStore
// ============================================================================

/// Rows of one parent: the primary key view and the ordering index view.
#[derive(Default)]
struct ParentRows {
    /// id → last_update currently indexed for it
    by_id: HashMap<String, Timestamp>,
    /// (last_update, id) → doc
    ordered: BTreeMap<(Timestamp, String), Doc>,
}

impl ParentRows {
    fn upsert(&mut self, entity: &CacheEntity) {
        if let Some(previous) = self.by_id.insert(entity.doc.id.clone(), entity.last_update) {
            self.ordered.remove(&(previous, entity.doc.id.clone()));
        }
        self.ordered
            .insert((entity.last_update, entity.doc.id.clone()), entity.doc.clone());
    }
}

/// [`IndexStore`] held entirely in memory behind a `parking_lot::Mutex`.
#[derive(Default)]
pub struct MemoryIndexStore {
    parents: Mutex<HashMap<String, ParentRows>>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexStore for MemoryIndexStore {
    fn put(&self, entity: &CacheEntity) -> Result<()> {
        self.parents
            .lock()
            .entry(entity.parent.clone())
            .or_default()
            .upsert(entity);
        Ok(())
    }

    fn bulk_put(&self, entities: &[CacheEntity]) -> Result<()> {
        let mut parents = self.parents.lock();
        for entity in entities {
            parents.entry(entity.parent.clone()).or_default().upsert(entity);
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.parents.lock().clear();
        Ok(())
    }

    fn scan(&self, range: &KeyRange<'_>) -> Result<Vec<CacheEntity>> {
        let parents = self.parents.lock();
        let (Some(rows), Some(first)) = (parents.get(range.parent), range.first_included()) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .ordered
            .range((first, String::new())..)
            .map(|((last_update, _), doc)| CacheEntity {
                parent: range.parent.to_string(),
                doc: doc.clone(),
                last_update: *last_update,
            })
            .collect())
    }

    fn get(&self, parent: &str, id: &str) -> Result<Option<CacheEntity>> {
        let parents = self.parents.lock();
        let Some(rows) = parents.get(parent) else {
            return Ok(None);
        };
        Ok(rows.by_id.get(id).and_then(|last_update| {
            rows.ordered
                .get(&(*last_update, id.to_string()))
                .map(|doc| CacheEntity {
                    parent: parent.to_string(),
                    doc: doc.clone(),
                    last_update: *last_update,
                })
        }))
    }

    fn count(&self, parent: &str) -> Result<usize> {
        Ok(self
            .parents
            .lock()
            .get(parent)
            .map_or(0, |rows| rows.by_id.len()))
    }
}

// ============================================================================
// MemoryStoreFactory
// ============================================================================

/// Opens [`MemoryIndexStore`]s keyed by `(cache_name, store_name)`.
///
/// A factory built with [`MemoryStoreFactory::failing`] refuses every open,
/// which is how tests exercise the unrecoverable open path.
#[derive(Default)]
pub struct MemoryStoreFactory {
    stores: Mutex<HashMap<(String, String), Arc<MemoryIndexStore>>>,
    failure: Option<String>,
    opens: AtomicUsize,
}

impl MemoryStoreFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// The store registered under `(cache_name, store_name)`, creating it if
    /// needed. Lets callers seed a cache before any layer opens it.
    pub fn store(&self, cache_name: &str, store_name: &str) -> Arc<MemoryIndexStore> {
        Arc::clone(
            self.stores
                .lock()
                .entry((cache_name.to_string(), store_name.to_string()))
                .or_default(),
        )
    }

    /// Number of `open` calls seen so far, including failed ones.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreFactory for MemoryStoreFactory {
    async fn open(&self, config: &CacheConfig) -> Result<Arc<dyn IndexStore>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        // Yield once so concurrent callers really overlap with the open.
        tokio::task::yield_now().await;
        if let Some(message) = &self.failure {
            return Err(DocStoreError::Internal(message.clone()));
        }
        let store: Arc<dyn IndexStore> = self.store(&config.cache_name, &config.store_name);
        Ok(store)
    }
}
