pub mod error;
pub mod types;

pub mod cache;
pub mod database;
pub mod schema;
pub mod storage;
pub mod validation;

pub use cache::{CacheConfig, CacheLayer};
pub use database::{Database, DocStream, MemoryDatabase};
pub use error::{DocStoreError, Result};
pub use types::{Batch, CacheEntity, CollectionPath, Doc, DocResult, OperationCode, Timestamp};
pub use validation::{ValidationLayer, ValidatorSet};
