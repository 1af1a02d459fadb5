//! CacheLayer tests.
//!
//! Uses a scripted mock remote and the in-memory store factory so the store
//! contents can be inspected directly.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use docstack::cache::{CacheConfig, CacheLayer};
use docstack::database::{Database, DocStream};
use docstack::error::{DocStoreError, Result};
use docstack::storage::{IndexStore, KeyRange, MemoryIndexStore, MemoryStoreFactory, StoreFactory};
use docstack::types::{
    Batch, CacheEntity, CollectionPath, Doc, DocResult, OperationCode, Timestamp,
};

// ============================================================================
// Mock Remote
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
struct GetCall {
    path: String,
    after: Option<Timestamp>,
}

struct MockRemoteInner {
    get_script: Vec<std::result::Result<Batch, String>>,
    put_stamp: Timestamp,
    put_error: Option<String>,
    get_calls: Vec<GetCall>,
    put_calls: Vec<(String, Doc)>,
}

struct MockRemote {
    inner: Mutex<MockRemoteInner>,
}

impl MockRemote {
    fn new() -> Self {
        Self {
            inner: Mutex::new(MockRemoteInner {
                get_script: Vec::new(),
                put_stamp: 100,
                put_error: None,
                get_calls: Vec::new(),
                put_calls: Vec::new(),
            }),
        }
    }

    /// Batches (or errors) every `get_docs` call will emit, in order.
    fn on_get(&self, script: Vec<std::result::Result<Batch, String>>) {
        self.inner.lock().get_script = script;
    }

    fn stamp_puts_with(&self, last_update: Timestamp) {
        self.inner.lock().put_stamp = last_update;
    }

    fn fail_puts(&self, message: &str) {
        self.inner.lock().put_error = Some(message.to_string());
    }

    fn get_calls(&self) -> Vec<GetCall> {
        self.inner.lock().get_calls.clone()
    }

    fn put_calls(&self) -> Vec<(String, Doc)> {
        self.inner.lock().put_calls.clone()
    }
}

#[async_trait]
impl Database for MockRemote {
    fn get_docs(
        &self,
        _op: &OperationCode,
        path: &CollectionPath,
        after: Option<Timestamp>,
    ) -> DocStream {
        let mut inner = self.inner.lock();
        inner.get_calls.push(GetCall {
            path: path.parent(),
            after,
        });
        let items: Vec<Result<Batch>> = inner
            .get_script
            .iter()
            .map(|item| item.clone().map_err(DocStoreError::remote))
            .collect();
        DocStream::from_stream(futures::stream::iter(items))
    }

    async fn put_doc(
        &self,
        _op: &OperationCode,
        path: &CollectionPath,
        doc: Doc,
    ) -> Result<DocResult> {
        let mut inner = self.inner.lock();
        inner.put_calls.push((path.parent(), doc.clone()));
        if let Some(message) = &inner.put_error {
            return Err(DocStoreError::remote(message.clone()));
        }
        Ok(DocResult::new(inner.put_stamp, doc.with("serverTouched", json!(true))))
    }
}

// ============================================================================
// Store whose writes always fail
// ============================================================================

struct ReadOnlyStore(MemoryIndexStore);

impl IndexStore for ReadOnlyStore {
    fn put(&self, _entity: &CacheEntity) -> Result<()> {
        Err(DocStoreError::Internal("read-only".to_string()))
    }
    fn bulk_put(&self, _entities: &[CacheEntity]) -> Result<()> {
        Err(DocStoreError::Internal("read-only".to_string()))
    }
    fn clear(&self) -> Result<()> {
        self.0.clear()
    }
    fn scan(&self, range: &KeyRange<'_>) -> Result<Vec<CacheEntity>> {
        self.0.scan(range)
    }
    fn get(&self, parent: &str, id: &str) -> Result<Option<CacheEntity>> {
        self.0.get(parent, id)
    }
    fn count(&self, parent: &str) -> Result<usize> {
        self.0.count(parent)
    }
}

struct ReadOnlyFactory;

#[async_trait]
impl StoreFactory for ReadOnlyFactory {
    async fn open(&self, _config: &CacheConfig) -> Result<Arc<dyn IndexStore>> {
        Ok(Arc::new(ReadOnlyStore(MemoryIndexStore::new())))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn breakfasts() -> CollectionPath {
    CollectionPath::bucket("breakfasts").unwrap()
}

fn op() -> OperationCode {
    OperationCode::new()
}

fn result(last_update: Timestamp, id: &str, rev: i64) -> DocResult {
    DocResult::new(last_update, Doc::new(id, rev))
}

fn setup() -> (
    Arc<MockRemote>,
    Arc<MemoryStoreFactory>,
    CacheLayer<Arc<MockRemote>>,
) {
    let remote = Arc::new(MockRemote::new());
    let factory = Arc::new(MemoryStoreFactory::new());
    let layer = CacheLayer::new(
        Arc::clone(&remote),
        CacheConfig::new("offline"),
        Arc::clone(&factory),
    );
    (remote, factory, layer)
}

/// Let spawned producers run until `done` holds (single-threaded runtime).
async fn settle(done: impl Fn() -> bool) {
    for _ in 0..1000 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

// ============================================================================
// Reads
// ============================================================================

#[tokio::test]
async fn empty_cache_emits_empty_batch_then_remote_batch() {
    let (remote, factory, layer) = setup();
    remote.on_get(vec![Ok(vec![result(10, "a", 0)])]);

    let batches = layer
        .get_docs(&op(), &breakfasts(), None)
        .try_collect_batches()
        .await
        .unwrap();

    assert_eq!(batches, vec![vec![], vec![result(10, "a", 0)]]);

    let store = factory.store("offline", "cache");
    assert_eq!(
        store.get("breakfasts", "a").unwrap(),
        Some(CacheEntity::new("breakfasts", result(10, "a", 0)))
    );
}

#[tokio::test]
async fn cached_entry_is_emitted_first_regardless_of_remote() {
    let (remote, factory, layer) = setup();
    factory
        .store("offline", "cache")
        .put(&CacheEntity::new("breakfasts", result(5, "a", 0)))
        .unwrap();
    remote.on_get(vec![Ok(vec![result(12, "a", 1), result(13, "b", 0)])]);

    let mut stream = layer.get_docs(&op(), &breakfasts(), Some(0));
    let first = stream.next_batch().await.unwrap().unwrap();
    assert_eq!(first, vec![result(5, "a", 0)]);

    let second = stream.next_batch().await.unwrap().unwrap();
    assert_eq!(second, vec![result(12, "a", 1), result(13, "b", 0)]);
    assert!(stream.next_batch().await.is_none());
}

#[tokio::test]
async fn cache_batch_honours_after_and_ordering() {
    let (_remote, factory, layer) = setup();
    factory
        .store("offline", "cache")
        .bulk_put(&[
            CacheEntity::new("breakfasts", result(30, "c", 0)),
            CacheEntity::new("breakfasts", result(20, "b", 0)),
            CacheEntity::new("breakfasts", result(20, "a", 0)),
            CacheEntity::new("breakfasts", result(10, "z", 0)),
            CacheEntity::new("lunches", result(40, "l", 0)),
        ])
        .unwrap();

    let batches = layer
        .get_docs(&op(), &breakfasts(), Some(10))
        .try_collect_batches()
        .await
        .unwrap();

    assert_eq!(
        batches[0],
        vec![result(20, "a", 0), result(20, "b", 0), result(30, "c", 0)]
    );
}

#[tokio::test]
async fn remote_receives_same_path_and_after() {
    let (remote, _factory, layer) = setup();
    let path = CollectionPath::collection("breakfasts", "b-0001", "eggs").unwrap();

    layer
        .get_docs(&op(), &path, Some(42))
        .try_collect_batches()
        .await
        .unwrap();

    assert_eq!(
        remote.get_calls(),
        vec![GetCall {
            path: "breakfasts/b-0001/eggs".to_string(),
            after: Some(42),
        }]
    );
}

#[tokio::test]
async fn every_remote_batch_is_cached_and_forwarded_in_order() {
    let (remote, factory, layer) = setup();
    remote.on_get(vec![
        Ok(vec![result(10, "a", 0)]),
        Ok(vec![]),
        Ok(vec![result(11, "b", 0), result(12, "c", 0)]),
    ]);

    let batches = layer
        .get_docs(&op(), &breakfasts(), None)
        .try_collect_batches()
        .await
        .unwrap();

    assert_eq!(
        batches,
        vec![
            vec![],
            vec![result(10, "a", 0)],
            vec![],
            vec![result(11, "b", 0), result(12, "c", 0)],
        ]
    );
    assert_eq!(factory.store("offline", "cache").count("breakfasts").unwrap(), 3);
}

#[tokio::test]
async fn duplicates_across_sources_are_not_merged() {
    let (remote, factory, layer) = setup();
    factory
        .store("offline", "cache")
        .put(&CacheEntity::new("breakfasts", result(10, "a", 0)))
        .unwrap();
    remote.on_get(vec![Ok(vec![result(10, "a", 0)])]);

    let docs = layer
        .get_docs(&op(), &breakfasts(), None)
        .try_collect_docs()
        .await
        .unwrap();
    assert_eq!(docs, vec![result(10, "a", 0), result(10, "a", 0)]);
}

#[tokio::test]
async fn remote_error_follows_cache_batch() {
    let (remote, factory, layer) = setup();
    factory
        .store("offline", "cache")
        .put(&CacheEntity::new("breakfasts", result(5, "a", 0)))
        .unwrap();
    remote.on_get(vec![
        Ok(vec![result(10, "b", 0)]),
        Err("network unreachable".to_string()),
    ]);

    let mut stream = layer.get_docs(&op(), &breakfasts(), None);
    assert_eq!(stream.next_batch().await.unwrap().unwrap(), vec![result(5, "a", 0)]);
    assert_eq!(stream.next_batch().await.unwrap().unwrap(), vec![result(10, "b", 0)]);
    let err = stream.next_batch().await.unwrap().unwrap_err();
    assert_eq!(err.to_string(), "network unreachable");
    assert!(stream.next_batch().await.is_none());
}

#[tokio::test]
async fn dropped_reader_still_populates_cache() {
    let (remote, factory, layer) = setup();
    remote.on_get(vec![Ok(vec![result(10, "a", 0), result(11, "b", 0)])]);

    drop(layer.get_docs(&op(), &breakfasts(), None));

    let store = factory.store("offline", "cache");
    settle(|| store.count("breakfasts").unwrap() == 2).await;
}

#[tokio::test]
async fn writeback_failure_still_emits_remote_batch() {
    let remote = Arc::new(MockRemote::new());
    remote.on_get(vec![Ok(vec![result(10, "a", 0)])]);
    let layer = CacheLayer::new(Arc::clone(&remote), CacheConfig::new("offline"), ReadOnlyFactory);

    let batches = layer
        .get_docs(&op(), &breakfasts(), None)
        .try_collect_batches()
        .await
        .unwrap();
    assert_eq!(batches, vec![vec![], vec![result(10, "a", 0)]]);
}

// ============================================================================
// Writes
// ============================================================================

#[tokio::test]
async fn put_returns_inner_result_and_caches_it() {
    let (remote, factory, layer) = setup();
    remote.stamp_puts_with(77);

    let written = layer
        .put_doc(&op(), &breakfasts(), Doc::new("b1", 0))
        .await
        .unwrap();

    let expected = DocResult::new(77, Doc::new("b1", 0).with("serverTouched", json!(true)));
    assert_eq!(written, expected);
    assert_eq!(remote.put_calls(), vec![("breakfasts".to_string(), Doc::new("b1", 0))]);
    assert_eq!(
        factory.store("offline", "cache").get("breakfasts", "b1").unwrap(),
        Some(CacheEntity::new("breakfasts", expected))
    );
}

#[tokio::test]
async fn written_doc_is_read_back_from_cache() {
    let (remote, _factory, layer) = setup();
    remote.stamp_puts_with(50);
    let path = CollectionPath::collection("breakfasts", "b-0001", "eggs").unwrap();

    let written = layer.put_doc(&op(), &path, Doc::new("e1", 0)).await.unwrap();

    let mut stream = layer.get_docs(&op(), &path, Some(written.last_update - 1));
    let cached = stream.next_batch().await.unwrap().unwrap();
    assert_eq!(cached, vec![written]);

    // Same bucket, different scope: nothing.
    let other = layer
        .get_docs(&op(), &breakfasts(), None)
        .next_batch()
        .await
        .unwrap()
        .unwrap();
    assert!(other.is_empty());
}

#[tokio::test]
async fn remote_put_failure_passes_through_and_caches_nothing() {
    let (remote, factory, layer) = setup();
    remote.fail_puts("409 conflict");

    let err = layer
        .put_doc(&op(), &breakfasts(), Doc::new("b1", 0))
        .await
        .unwrap_err();
    assert!(matches!(err, DocStoreError::Remote(_)));
    assert_eq!(err.to_string(), "409 conflict");
    assert_eq!(factory.store("offline", "cache").count("breakfasts").unwrap(), 0);
}

#[tokio::test]
async fn put_cache_write_failure_is_reported() {
    let remote = Arc::new(MockRemote::new());
    let layer = CacheLayer::new(Arc::clone(&remote), CacheConfig::new("offline"), ReadOnlyFactory);

    let err = layer
        .put_doc(&op(), &breakfasts(), Doc::new("b1", 0))
        .await
        .unwrap_err();
    assert!(matches!(err, DocStoreError::Internal(_)));
    assert_eq!(remote.put_calls().len(), 1);
}

// ============================================================================
// Store lifecycle
// ============================================================================

#[tokio::test]
async fn store_is_opened_lazily_and_once() {
    let (_remote, factory, layer) = setup();
    assert_eq!(factory.open_count(), 0);

    let path = breakfasts();
    let (op_a, op_b, op_c) = (op(), op(), op());
    let (a, b, c) = tokio::join!(
        layer.get_docs(&op_a, &path, None).try_collect_batches(),
        layer.put_doc(&op_b, &path, Doc::new("b1", 0)),
        layer.get_docs(&op_c, &path, None).try_collect_batches(),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    layer.put_doc(&op(), &path, Doc::new("b2", 0)).await.unwrap();
    assert_eq!(factory.open_count(), 1);
}

#[tokio::test]
async fn open_failure_is_replayed_to_every_caller() {
    let remote = Arc::new(MockRemote::new());
    let factory = Arc::new(MemoryStoreFactory::failing("storage disabled"));
    let layer = CacheLayer::new(
        Arc::clone(&remote),
        CacheConfig::new("offline"),
        Arc::clone(&factory),
    );

    for _ in 0..2 {
        let err = layer
            .get_docs(&op(), &breakfasts(), None)
            .try_collect_batches()
            .await
            .unwrap_err();
        assert!(
            matches!(err, DocStoreError::CacheOpen { ref cache, ref message }
                if cache == "offline" && message.contains("storage disabled")),
            "{err}"
        );

        let err = layer
            .put_doc(&op(), &breakfasts(), Doc::new("b1", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DocStoreError::CacheOpen { .. }), "{err}");
    }

    assert_eq!(factory.open_count(), 1);
    assert!(remote.put_calls().is_empty());
    assert!(remote.get_calls().is_empty());
}

#[tokio::test]
async fn invalid_config_fails_like_an_open_error() {
    let remote = Arc::new(MockRemote::new());
    let factory = Arc::new(MemoryStoreFactory::new());
    let layer = CacheLayer::new(remote, CacheConfig::new(""), Arc::clone(&factory));

    let err = layer.clear().await.unwrap_err();
    assert!(matches!(err, DocStoreError::CacheOpen { .. }), "{err}");
    assert_eq!(factory.open_count(), 0);
}

#[tokio::test]
async fn clear_on_start_wipes_existing_rows() {
    let remote = Arc::new(MockRemote::new());
    let factory = Arc::new(MemoryStoreFactory::new());
    factory
        .store("offline", "cache")
        .put(&CacheEntity::new("breakfasts", result(5, "a", 0)))
        .unwrap();

    let layer = CacheLayer::new(
        remote,
        CacheConfig::new("offline").clear_on_start(true),
        Arc::clone(&factory),
    );
    let batches = layer
        .get_docs(&op(), &breakfasts(), None)
        .try_collect_batches()
        .await
        .unwrap();
    assert_eq!(batches, vec![vec![]]);
}

#[tokio::test]
async fn clear_empties_the_cache() {
    let (remote, factory, layer) = setup();
    remote.stamp_puts_with(10);
    layer.put_doc(&op(), &breakfasts(), Doc::new("b1", 0)).await.unwrap();

    layer.clear().await.unwrap();
    assert_eq!(factory.store("offline", "cache").count("breakfasts").unwrap(), 0);
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn works_over_sqlite_store() {
    let remote = Arc::new(MockRemote::new());
    remote.on_get(vec![Ok(vec![result(10, "a", 0)])]);
    remote.stamp_puts_with(20);
    let layer = CacheLayer::new(
        Arc::clone(&remote),
        CacheConfig::new("offline"),
        docstack::storage::SqliteStoreFactory::in_memory(),
    );

    layer.put_doc(&op(), &breakfasts(), Doc::new("b1", 0)).await.unwrap();
    let batches = layer
        .get_docs(&op(), &breakfasts(), None)
        .try_collect_batches()
        .await
        .unwrap();

    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0][0].doc.id, "b1");
    assert_eq!(batches[1], vec![result(10, "a", 0)]);

    let again = layer
        .get_docs(&op(), &breakfasts(), Some(10))
        .next_batch()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].last_update, 20);
}
