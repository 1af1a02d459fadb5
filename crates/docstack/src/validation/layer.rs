//! `ValidationLayer<D>`: validator wrapper around an inner [`Database`].
//!
//! Reads drop documents that fail any `get` validator. Writes are refused when
//! a `put` validator fails, and the document handed back by the inner database
//! is re-checked with the `get` validators.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;

use crate::{
    database::{Database, DocStream},
    error::{DocStoreError, Result},
    types::{Batch, CollectionPath, Doc, DocResult, OperationCode, Timestamp},
};

use super::validators::{run_validators, ValidatorSet};

/// Wraps a [`Database`] with ordered `get`/`put` validator lists.
pub struct ValidationLayer<D> {
    inner: D,
    validators: Arc<ValidatorSet>,
}

impl<D: Database> ValidationLayer<D> {
    pub fn new(inner: D, validators: ValidatorSet) -> Self {
        Self {
            inner,
            validators: Arc::new(validators),
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }
}

/// Keep the documents of `batch` that pass every `get` validator, in order.
fn filter_batch(
    validators: &ValidatorSet,
    op: &OperationCode,
    path: &CollectionPath,
    batch: Batch,
) -> Batch {
    batch
        .into_iter()
        .filter(|result| match run_validators(&validators.get, path, &result.doc) {
            None => true,
            Some(violation) => {
                tracing::warn!(
                    op = %op,
                    path = %path,
                    validator = %violation.validator,
                    reason = %violation.reason,
                    doc = %result.doc.to_value(),
                    "dropping invalid document from read"
                );
                false
            }
        })
        .collect()
}

#[async_trait]
impl<D: Database> Database for ValidationLayer<D> {
    fn get_docs(
        &self,
        op: &OperationCode,
        path: &CollectionPath,
        after: Option<Timestamp>,
    ) -> DocStream {
        let upstream = self.inner.get_docs(op, path, after);
        if self.validators.get.is_empty() {
            return upstream;
        }

        let validators = Arc::clone(&self.validators);
        let op = op.clone();
        let path = path.clone();
        DocStream::from_stream(upstream.map(move |item| {
            item.map(|batch| filter_batch(&validators, &op, &path, batch))
        }))
    }

    async fn put_doc(
        &self,
        op: &OperationCode,
        path: &CollectionPath,
        doc: Doc,
    ) -> Result<DocResult> {
        if let Some(violation) = run_validators(&self.validators.put, path, &doc) {
            tracing::warn!(
                op = %op,
                path = %path,
                validator = %violation.validator,
                reason = %violation.reason,
                doc = %doc.to_value(),
                "rejecting invalid write"
            );
            return Err(DocStoreError::PutRejected {
                path: path.to_string(),
                id: doc.id,
                validator: violation.validator,
                reason: violation.reason,
            });
        }

        let result = self.inner.put_doc(op, path, doc).await?;

        if let Some(violation) = run_validators(&self.validators.get, path, &result.doc) {
            tracing::error!(
                op = %op,
                path = %path,
                validator = %violation.validator,
                reason = %violation.reason,
                doc = %result.doc.to_value(),
                "backend returned an invalid document after write"
            );
            return Err(DocStoreError::InvalidResponse {
                path: path.to_string(),
                id: result.doc.id,
                validator: violation.validator,
                reason: violation.reason,
            });
        }

        Ok(result)
    }
}
