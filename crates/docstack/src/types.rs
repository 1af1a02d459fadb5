use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{DocStoreError, PathError, Result, StorageError};

/// Backend-assigned epoch timestamp in milliseconds.
pub type Timestamp = i64;

/// One batch emitted by [`Database::get_docs`](crate::database::Database::get_docs).
pub type Batch = Vec<DocResult>;

// ============================================================================
// CollectionPath
// ============================================================================

/// Address of a set of documents: every document of a root bucket, or every
/// document of a named sub-collection scoped to one bucket document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged, try_from = "RawCollectionPath")]
pub enum CollectionPath {
    #[serde(rename_all = "camelCase")]
    Collection {
        bucket: String,
        bucket_id: String,
        collection: String,
    },
    Bucket { bucket: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCollectionPath {
    bucket: String,
    bucket_id: Option<String>,
    collection: Option<String>,
}

impl TryFrom<RawCollectionPath> for CollectionPath {
    type Error = PathError;

    fn try_from(raw: RawCollectionPath) -> std::result::Result<Self, Self::Error> {
        match (raw.bucket_id, raw.collection) {
            (None, None) => CollectionPath::bucket(raw.bucket),
            (Some(bucket_id), Some(collection)) => {
                CollectionPath::collection(raw.bucket, bucket_id, collection)
            }
            (Some(_), None) => Err(PathError::EmptyComponent("collection")),
            (None, Some(_)) => Err(PathError::EmptyComponent("bucketId")),
        }
    }
}

fn non_empty(value: String, component: &'static str) -> std::result::Result<String, PathError> {
    if value.is_empty() {
        Err(PathError::EmptyComponent(component))
    } else if value.contains('/') {
        Err(PathError::Separator { component, value })
    } else {
        Ok(value)
    }
}

impl CollectionPath {
    /// Path addressing every document of a root bucket.
    pub fn bucket(bucket: impl Into<String>) -> std::result::Result<Self, PathError> {
        Ok(CollectionPath::Bucket {
            bucket: non_empty(bucket.into(), "bucket")?,
        })
    }

    /// Path addressing a sub-collection of one bucket document.
    pub fn collection(
        bucket: impl Into<String>,
        bucket_id: impl Into<String>,
        collection: impl Into<String>,
    ) -> std::result::Result<Self, PathError> {
        Ok(CollectionPath::Collection {
            bucket: non_empty(bucket.into(), "bucket")?,
            bucket_id: non_empty(bucket_id.into(), "bucketId")?,
            collection: non_empty(collection.into(), "collection")?,
        })
    }

    pub fn bucket_name(&self) -> &str {
        match self {
            CollectionPath::Bucket { bucket } | CollectionPath::Collection { bucket, .. } => bucket,
        }
    }

    pub fn bucket_id(&self) -> Option<&str> {
        match self {
            CollectionPath::Bucket { .. } => None,
            CollectionPath::Collection { bucket_id, .. } => Some(bucket_id),
        }
    }

    pub fn collection_name(&self) -> Option<&str> {
        match self {
            CollectionPath::Bucket { .. } => None,
            CollectionPath::Collection { collection, .. } => Some(collection),
        }
    }

    /// Flattened scope key used to tag rows in the local store:
    /// `"bucket"` or `"bucket/bucketId/collection"`.
    pub fn parent(&self) -> String {
        match self {
            CollectionPath::Bucket { bucket } => bucket.clone(),
            CollectionPath::Collection {
                bucket,
                bucket_id,
                collection,
            } => format!("{bucket}/{bucket_id}/{collection}"),
        }
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionPath::Bucket { bucket } => f.write_str(bucket),
            CollectionPath::Collection {
                bucket,
                bucket_id,
                collection,
            } => write!(f, "{bucket}/{bucket_id}/{collection}"),
        }
    }
}

impl FromStr for CollectionPath {
    type Err = PathError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [bucket] => CollectionPath::bucket(*bucket),
            [bucket, bucket_id, collection] => {
                CollectionPath::collection(*bucket, *bucket_id, *collection)
            }
            _ => Err(PathError::Malformed(s.to_string())),
        }
    }
}

// ============================================================================
// Doc
// ============================================================================

/// Application document. `rev` is signed so that a malformed negative
/// revision can be represented and rejected by validation.
///
/// `id` and `rev` keys found in `fields` are never written out; the struct
/// members are authoritative.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Doc {
    pub id: String,
    pub rev: i64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Doc {
    pub fn new(id: impl Into<String>, rev: i64) -> Self {
        Self {
            id: id.into(),
            rev,
            fields: Map::new(),
        }
    }

    /// Builder-style field setter. `"id"` and `"rev"` set the struct members
    /// instead; a value of the wrong type for either is ignored.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        match key.as_str() {
            "id" => {
                if let Value::String(id) = value {
                    self.id = id;
                }
            }
            "rev" => {
                if let Some(rev) = value.as_i64() {
                    self.rev = rev;
                }
            }
            _ => {
                self.fields.insert(key, value);
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// JSON object form: `{ "id", "rev", ...fields }`.
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.fields.len() + 2);
        map.insert("id".to_string(), Value::String(self.id.clone()));
        map.insert("rev".to_string(), Value::from(self.rev));
        for (k, v) in self.extra_fields() {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }

    fn extra_fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter().filter(|(k, _)| !is_reserved_key(k))
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        serde_json::from_value(value).map_err(|source| {
            DocStoreError::Storage(StorageError::Serialization { id, source })
        })
    }
}

fn is_reserved_key(key: &str) -> bool {
    key == "id" || key == "rev"
}

impl Serialize for Doc {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("rev", &self.rev)?;
        for (k, v) in self.extra_fields() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ============================================================================
// DocResult
// ============================================================================

/// A document together with the time the backend last touched it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocResult {
    pub last_update: Timestamp,
    pub doc: Doc,
}

impl DocResult {
    pub fn new(last_update: Timestamp, doc: Doc) -> Self {
        Self { last_update, doc }
    }
}

// ============================================================================
// CacheEntity
// ============================================================================

/// Row of the local index store. Primary key `(parent, doc.id)`, ordering key
/// `(parent, last_update, doc.id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntity {
    pub parent: String,
    pub doc: Doc,
    pub last_update: Timestamp,
}

impl CacheEntity {
    pub fn new(parent: impl Into<String>, result: DocResult) -> Self {
        Self {
            parent: parent.into(),
            doc: result.doc,
            last_update: result.last_update,
        }
    }

    pub fn into_result(self) -> DocResult {
        DocResult {
            last_update: self.last_update,
            doc: self.doc,
        }
    }
}

// ============================================================================
// OperationCode
// ============================================================================

/// Correlation token threaded through every call for tracing. Time-ordered
/// (UUID v7), so codes sort lexicographically by creation time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationCode(String);

impl OperationCode {
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OperationCode {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for OperationCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}
