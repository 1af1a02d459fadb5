//! `CacheLayer<D>`: stale-while-revalidate cache over an inner [`Database`].
//!
//! Reads emit the locally cached slice first, then every batch of the inner
//! database after writing it back to the local store. Writes go to the inner
//! database and the authoritative result is upserted locally.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::{
    database::{BatchSender, Database, DocStream},
    error::{DocStoreError, Result},
    storage::{IndexStore, KeyRange, StoreFactory},
    types::{Batch, CacheEntity, CollectionPath, Doc, DocResult, OperationCode, Timestamp},
};

use super::config::CacheConfig;

/// Memoised outcome of the one and only store open.
type OpenOutcome = std::result::Result<Arc<dyn IndexStore>, String>;

// ============================================================================
// Shared state
// ============================================================================

/// State shared between the layer and the tasks it spawns for reads.
struct Shared<D> {
    inner: D,
    config: CacheConfig,
    factory: Box<dyn StoreFactory>,
    store: OnceCell<OpenOutcome>,
}

impl<D: Database> Shared<D> {
    /// The store handle. The first caller opens it; concurrent callers wait on
    /// that same open; a failed open is replayed to every later caller.
    async fn store(&self) -> Result<Arc<dyn IndexStore>> {
        match self.store.get_or_init(|| self.open()).await {
            Ok(store) => Ok(Arc::clone(store)),
            Err(message) => Err(DocStoreError::CacheOpen {
                cache: self.config.cache_name.clone(),
                message: message.clone(),
            }),
        }
    }

    async fn open(&self) -> OpenOutcome {
        let opened = async {
            self.config.validate()?;
            let store = self.factory.open(&self.config).await?;
            if self.config.clear_on_start {
                store.clear()?;
            }
            Ok::<_, DocStoreError>(store)
        }
        .await;

        match opened {
            Ok(store) => {
                tracing::debug!(
                    cache = %self.config.cache_name,
                    store = %self.config.store_name,
                    cleared = self.config.clear_on_start,
                    "local cache opened"
                );
                Ok(store)
            }
            Err(e) => {
                tracing::error!(
                    cache = %self.config.cache_name,
                    error = %e,
                    "failed to open local cache"
                );
                Err(e.to_string())
            }
        }
    }

    /// Body of a read: cached slice first, then each inner batch after
    /// writeback. Runs to completion even if the consumer goes away.
    async fn revalidate(
        &self,
        op: OperationCode,
        path: CollectionPath,
        after: Option<Timestamp>,
        tx: BatchSender,
    ) {
        let store = match self.store().await {
            Ok(store) => store,
            Err(e) => {
                tx.fail(e);
                return;
            }
        };
        let parent = path.parent();

        let cached: Batch = match store.scan(&KeyRange::new(&parent, after)) {
            Ok(rows) => rows.into_iter().map(CacheEntity::into_result).collect(),
            Err(e) => {
                tracing::warn!(op = %op, path = %path, error = %e, "local cache read failed");
                Vec::new()
            }
        };
        tracing::debug!(op = %op, path = %path, count = cached.len(), "emitting cached batch");
        tx.send(cached);

        let mut remote = self.inner.get_docs(&op, &path, after);
        while let Some(item) = remote.next_batch().await {
            let batch = match item {
                Ok(batch) => batch,
                Err(e) => {
                    tx.fail(e);
                    return;
                }
            };

            let entities: Vec<CacheEntity> = batch
                .iter()
                .map(|r| CacheEntity::new(parent.as_str(), r.clone()))
                .collect();
            if let Err(e) = store.bulk_put(&entities) {
                tracing::warn!(
                    op = %op,
                    path = %path,
                    count = entities.len(),
                    error = %e,
                    "cache writeback failed; emitting remote batch anyway"
                );
            }

            tracing::debug!(op = %op, path = %path, count = batch.len(), "emitting remote batch");
            if !tx.send(batch) {
                tracing::trace!(op = %op, path = %path, "reader gone; still populating cache");
            }
        }
    }
}

// ============================================================================
// CacheLayer
// ============================================================================

/// Caching [`Database`] decorator backed by a lazily opened [`IndexStore`].
///
/// `get_docs` spawns its producer on the current tokio runtime, so it must be
/// called from within one.
pub struct CacheLayer<D> {
    shared: Arc<Shared<D>>,
}

impl<D: Database + 'static> CacheLayer<D> {
    /// Wrap `inner`. Nothing is opened until the first call.
    pub fn new(inner: D, config: CacheConfig, factory: impl StoreFactory + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner,
                config,
                factory: Box::new(factory),
                store: OnceCell::new(),
            }),
        }
    }

    pub fn inner(&self) -> &D {
        &self.shared.inner
    }

    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    /// Remove every cached row.
    pub async fn clear(&self) -> Result<()> {
        self.shared.store().await?.clear()
    }
}

#[async_trait]
impl<D: Database + 'static> Database for CacheLayer<D> {
    fn get_docs(
        &self,
        op: &OperationCode,
        path: &CollectionPath,
        after: Option<Timestamp>,
    ) -> DocStream {
        let (tx, stream) = DocStream::channel();
        let shared = Arc::clone(&self.shared);
        let op = op.clone();
        let path = path.clone();
        tokio::spawn(async move { shared.revalidate(op, path, after, tx).await });
        stream
    }

    async fn put_doc(
        &self,
        op: &OperationCode,
        path: &CollectionPath,
        doc: Doc,
    ) -> Result<DocResult> {
        let store = self.shared.store().await?;
        let result = self.shared.inner.put_doc(op, path, doc).await?;
        store.put(&CacheEntity::new(path.parent(), result.clone()))?;
        tracing::debug!(
            op = %op,
            path = %path,
            id = %result.doc.id,
            last_update = result.last_update,
            "cached write result"
        );
        Ok(result)
    }
}
