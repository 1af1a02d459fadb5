//! Bucket/collection schema registry consumed by the schema validator.

use std::collections::HashMap;

use crate::types::CollectionPath;

use super::node::SchemaNode;

/// Schemas for one bucket: the bucket documents themselves plus each named
/// sub-collection.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketSchema {
    pub bucket: SchemaNode,
    pub collections: HashMap<String, SchemaNode>,
}

impl BucketSchema {
    pub fn new(bucket: SchemaNode) -> Self {
        Self {
            bucket,
            collections: HashMap::new(),
        }
    }

    /// Register the schema of a sub-collection.
    pub fn collection(mut self, name: impl Into<String>, schema: SchemaNode) -> Self {
        self.collections.insert(name.into(), schema);
        self
    }
}

/// Why a path has no schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupMiss {
    Bucket(String),
    Collection { bucket: String, collection: String },
}

impl std::fmt::Display for LookupMiss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupMiss::Bucket(b) => write!(f, "bucket \"{b}\" is not registered"),
            LookupMiss::Collection { bucket, collection } => write!(
                f,
                "collection \"{collection}\" is not registered for bucket \"{bucket}\""
            ),
        }
    }
}

/// Mapping from bucket name to its [`BucketSchema`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaRegistry {
    buckets: HashMap<String, BucketSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration. Replaces any previous entry for `name`.
    pub fn bucket(mut self, name: impl Into<String>, schema: BucketSchema) -> Self {
        self.insert(name, schema);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, schema: BucketSchema) {
        self.buckets.insert(name.into(), schema);
    }

    pub fn get(&self, bucket: &str) -> Option<&BucketSchema> {
        self.buckets.get(bucket)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Resolve the schema for the documents addressed by `path`.
    pub fn lookup(&self, path: &CollectionPath) -> Result<&SchemaNode, LookupMiss> {
        let bucket = path.bucket_name();
        let entry = self
            .buckets
            .get(bucket)
            .ok_or_else(|| LookupMiss::Bucket(bucket.to_string()))?;
        match path.collection_name() {
            None => Ok(&entry.bucket),
            Some(collection) => {
                entry
                    .collections
                    .get(collection)
                    .ok_or_else(|| LookupMiss::Collection {
                        bucket: bucket.to_string(),
                        collection: collection.to_string(),
                    })
            }
        }
    }
}
