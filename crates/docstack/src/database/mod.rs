//! The `Database` contract shared by every layer of the stack.
//!
//! Each layer is a `Database` wrapping another `Database`, so stacking order is
//! plain nested construction:
//!
//! ```ignore
//! let db = ValidationLayer::new(
//!     CacheLayer::new(remote, CacheConfig::new("offline"), factory),
//!     ValidatorSet::for_build(registry),
//! );
//! ```

pub mod memory;
pub mod stream;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CollectionPath, Doc, DocResult, OperationCode, Timestamp};

pub use memory::MemoryDatabase;
pub use stream::{BatchSender, DocStream};

/// Read/write access to the documents under a [`CollectionPath`].
///
/// `op` is a correlation token for tracing only; it never changes behavior.
#[async_trait]
pub trait Database: Send + Sync {
    /// Documents under `path` with `last_update > after` (all when `after` is
    /// `None`). May emit several batches; later batches supersede earlier ones.
    fn get_docs(
        &self,
        op: &OperationCode,
        path: &CollectionPath,
        after: Option<Timestamp>,
    ) -> DocStream;

    /// Write `doc` and return what the backend now holds for its id.
    async fn put_doc(&self, op: &OperationCode, path: &CollectionPath, doc: Doc)
        -> Result<DocResult>;
}

#[async_trait]
impl<D: Database + ?Sized> Database for Arc<D> {
    fn get_docs(
        &self,
        op: &OperationCode,
        path: &CollectionPath,
        after: Option<Timestamp>,
    ) -> DocStream {
        (**self).get_docs(op, path, after)
    }

    async fn put_doc(
        &self,
        op: &OperationCode,
        path: &CollectionPath,
        doc: Doc,
    ) -> Result<DocResult> {
        (**self).put_doc(op, path, doc).await
    }
}

#[async_trait]
impl<D: Database + ?Sized> Database for Box<D> {
    fn get_docs(
        &self,
        op: &OperationCode,
        path: &CollectionPath,
        after: Option<Timestamp>,
    ) -> DocStream {
        (**self).get_docs(op, path, after)
    }

    async fn put_doc(
        &self,
        op: &OperationCode,
        path: &CollectionPath,
        doc: Doc,
    ) -> Result<DocResult> {
        (**self).put_doc(op, path, doc).await
    }
}
