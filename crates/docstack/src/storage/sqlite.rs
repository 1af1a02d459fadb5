//! SQLite index store.
//!
//! One table per store name, primary key `(parent, id)`, plus a secondary
//! index on `(parent, last_update, id)` that serves every range scan. The
//! connection sits behind a `parking_lot::Mutex`; each trait call holds the
//! lock for exactly one statement or transaction.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use rusqlite::{params, OptionalExtension};

use crate::cache::CacheConfig;
use crate::error::{DocStoreError, Result, StorageError};
use crate::types::{CacheEntity, Doc, Timestamp};

use super::traits::{IndexStore, KeyRange, StoreFactory};

// ============================================================================
// Helpers
// ============================================================================

/// Map a rusqlite error to a `DocStoreError`.
fn storage_err(e: rusqlite::Error) -> DocStoreError {
    DocStoreError::Storage(StorageError::Sqlite(e))
}

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex is valid")
    })
}

fn file_stem_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_\-][A-Za-z0-9_.\-]*$").expect("file stem regex is valid")
    })
}

/// Table and index names are interpolated into SQL, so they are restricted to
/// plain identifiers.
fn check_identifier(name: &str) -> Result<&str> {
    if identifier_regex().is_match(name) {
        Ok(name)
    } else {
        Err(StorageError::InvalidIdentifier(name.to_string()).into())
    }
}

/// Cache names become file names.
fn check_file_stem(name: &str) -> Result<&str> {
    if file_stem_regex().is_match(name) {
        Ok(name)
    } else {
        Err(StorageError::InvalidIdentifier(name.to_string()).into())
    }
}

/// Raw row as read from SQLite, before the document JSON is parsed.
struct RawRow {
    parent: String,
    id: String,
    last_update: Timestamp,
    doc: String,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            parent: row.get(0)?,
            id: row.get(1)?,
            last_update: row.get(2)?,
            doc: row.get(3)?,
        })
    }

    fn into_entity(self) -> Result<CacheEntity> {
        let doc: Doc = serde_json::from_str(&self.doc).map_err(|e| StorageError::Corruption {
            parent: self.parent.clone(),
            id: self.id.clone(),
            field: "doc".to_string(),
            source: Box::new(e),
        })?;
        Ok(CacheEntity {
            parent: self.parent,
            doc,
            last_update: self.last_update,
        })
    }
}

fn serialize_doc(doc: &Doc) -> Result<String> {
    serde_json::to_string(doc).map_err(|source| {
        StorageError::Serialization {
            id: doc.id.clone(),
            source,
        }
        .into()
    })
}

// ============================================================================
// SqliteIndexStore
// ============================================================================

/// SQLite-backed [`IndexStore`].
pub struct SqliteIndexStore {
    conn: Mutex<rusqlite::Connection>,
    table: String,
}

impl SqliteIndexStore {
    /// Open (creating if necessary) a file-backed store.
    pub fn open(path: impl AsRef<Path>, store_name: &str, index_name: &str) -> Result<Self> {
        let conn = rusqlite::Connection::open(path).map_err(storage_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;",
        )
        .map_err(storage_err)?;
        Self::with_connection(conn, store_name, index_name)
    }

    /// Open an in-memory store (useful for tests).
    pub fn open_in_memory(store_name: &str, index_name: &str) -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(storage_err)?;
        Self::with_connection(conn, store_name, index_name)
    }

    fn with_connection(
        conn: rusqlite::Connection,
        store_name: &str,
        index_name: &str,
    ) -> Result<Self> {
        let table = check_identifier(store_name)?;
        let index = check_identifier(index_name)?;
        // Index names are schema-global in SQLite, so scope them by table.
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                parent      TEXT NOT NULL,
                id          TEXT NOT NULL,
                last_update INTEGER NOT NULL,
                doc         TEXT NOT NULL,
                PRIMARY KEY (parent, id)
            );
            CREATE INDEX IF NOT EXISTS {table}_{index}
                ON {table}(parent, last_update, id);"
        ))
        .map_err(storage_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
        })
    }

    fn upsert_sql(&self) -> String {
        format!(
            "INSERT OR REPLACE INTO {} (parent, id, last_update, doc) VALUES (?1, ?2, ?3, ?4)",
            self.table
        )
    }
}

impl IndexStore for SqliteIndexStore {
    fn put(&self, entity: &CacheEntity) -> Result<()> {
        let doc = serialize_doc(&entity.doc)?;
        let conn = self.conn.lock();
        conn.prepare_cached(&self.upsert_sql())
            .and_then(|mut stmt| {
                stmt.execute(params![entity.parent, entity.doc.id, entity.last_update, doc])
            })
            .map(|_| ())
            .map_err(storage_err)
    }

    fn bulk_put(&self, entities: &[CacheEntity]) -> Result<()> {
        let docs = entities
            .iter()
            .map(|e| serialize_doc(&e.doc))
            .collect::<Result<Vec<_>>>()?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(storage_err)?;
        {
            let mut stmt = tx.prepare_cached(&self.upsert_sql()).map_err(storage_err)?;
            for (entity, doc) in entities.iter().zip(&docs) {
                stmt.execute(params![entity.parent, entity.doc.id, entity.last_update, doc])
                    .map_err(storage_err)?;
            }
        }
        tx.commit().map_err(storage_err)
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(&format!("DELETE FROM {}", self.table), [])
            .map(|_| ())
            .map_err(storage_err)
    }

    fn scan(&self, range: &KeyRange<'_>) -> Result<Vec<CacheEntity>> {
        let Some(first) = range.first_included() else {
            return Ok(Vec::new());
        };
        let rows = {
            let conn = self.conn.lock();
            let mut stmt = conn
                .prepare_cached(&format!(
                    "SELECT parent, id, last_update, doc FROM {} \
                     WHERE parent = ?1 AND last_update >= ?2 \
                     ORDER BY last_update ASC, id ASC",
                    self.table
                ))
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(params![range.parent, first], RawRow::from_row)
                .map_err(storage_err)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(storage_err)?
        };
        // One undecodable row must not hide the rest of the range; `get`
        // still reports it as corruption.
        let entities = rows
            .into_iter()
            .filter_map(|row| match row.into_entity() {
                Ok(entity) => Some(entity),
                Err(e) => {
                    tracing::warn!(
                        parent = range.parent,
                        error = %e,
                        "skipping undecodable cached row"
                    );
                    None
                }
            })
            .collect();
        Ok(entities)
    }

    fn get(&self, parent: &str, id: &str) -> Result<Option<CacheEntity>> {
        let row = {
            let conn = self.conn.lock();
            conn.query_row(
                &format!(
                    "SELECT parent, id, last_update, doc FROM {} WHERE parent = ?1 AND id = ?2",
                    self.table
                ),
                params![parent, id],
                RawRow::from_row,
            )
            .optional()
            .map_err(storage_err)?
        };
        row.map(RawRow::into_entity).transpose()
    }

    fn count(&self, parent: &str) -> Result<usize> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE parent = ?1", self.table),
            params![parent],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as usize)
        .map_err(storage_err)
    }
}

// ============================================================================
// SqliteStoreFactory
// ============================================================================

#[derive(Debug, Clone)]
enum Location {
    Directory(PathBuf),
    InMemory,
}

/// Opens one SQLite database per cache name: `{dir}/{cache_name}.sqlite3`,
/// or a fresh in-memory database per open.
#[derive(Debug, Clone)]
pub struct SqliteStoreFactory {
    location: Location,
}

impl SqliteStoreFactory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::Directory(dir.into()),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: Location::InMemory,
        }
    }

    /// Database file used for `cache_name`, if file-backed.
    pub fn path_for(&self, cache_name: &str) -> Option<PathBuf> {
        match &self.location {
            Location::Directory(dir) => Some(dir.join(format!("{cache_name}.sqlite3"))),
            Location::InMemory => None,
        }
    }
}

#[async_trait]
impl StoreFactory for SqliteStoreFactory {
    async fn open(&self, config: &CacheConfig) -> Result<Arc<dyn IndexStore>> {
        check_file_stem(&config.cache_name)?;
        let path = self.path_for(&config.cache_name);
        let store_name = config.store_name.clone();
        let index_name = config.index_name.clone();

        let store = tokio::task::spawn_blocking(move || match path {
            Some(path) => SqliteIndexStore::open(path, &store_name, &index_name),
            None => SqliteIndexStore::open_in_memory(&store_name, &index_name),
        })
        .await
        .map_err(|e| DocStoreError::Internal(format!("store open task failed: {e}")))??;

        let store: Arc<dyn IndexStore> = Arc::new(store);
        Ok(store)
    }
}
