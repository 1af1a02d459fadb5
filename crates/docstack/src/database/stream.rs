//! `DocStream`: the push-based, multi-batch result of `get_docs`.
//!
//! A producer pushes zero or more batches and then either finishes (drops its
//! sender) or pushes one terminal error. A consumer that loses interest just
//! drops the stream; producers see `send` return `false` and are free to keep
//! running for their side effects.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio::sync::mpsc;

use crate::error::{DocStoreError, Result};
use crate::types::{Batch, DocResult};

// ============================================================================
// BatchSender
// ============================================================================

/// Producer half of [`DocStream::channel`].
#[derive(Debug, Clone)]
pub struct BatchSender {
    tx: mpsc::UnboundedSender<Result<Batch>>,
}

impl BatchSender {
    /// Push a batch. Returns `false` once the consumer has dropped the stream.
    pub fn send(&self, batch: Batch) -> bool {
        self.tx.send(Ok(batch)).is_ok()
    }

    /// Push the terminal error. Callers should stop producing afterwards.
    pub fn fail(&self, err: DocStoreError) -> bool {
        self.tx.send(Err(err)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ============================================================================
// DocStream
// ============================================================================

/// Finite stream of `Result<Batch>`. Earlier batches may be stale; later ones
/// are fresher.
pub struct DocStream {
    inner: BoxStream<'static, Result<Batch>>,
}

impl DocStream {
    /// Unbounded channel pair. The stream ends when every sender is dropped.
    pub fn channel() -> (BatchSender, DocStream) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let inner = stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed();
        (BatchSender { tx }, DocStream { inner })
    }

    pub fn from_batches(batches: Vec<Batch>) -> Self {
        Self {
            inner: stream::iter(batches.into_iter().map(Ok)).boxed(),
        }
    }

    /// A stream whose only item is `err`.
    pub fn failed(err: DocStoreError) -> Self {
        Self {
            inner: stream::iter(std::iter::once(Err(err))).boxed(),
        }
    }

    pub fn from_stream(s: impl Stream<Item = Result<Batch>> + Send + 'static) -> Self {
        Self { inner: s.boxed() }
    }

    pub async fn next_batch(&mut self) -> Option<Result<Batch>> {
        self.inner.next().await
    }

    /// Drain every batch, stopping at the first error.
    pub async fn try_collect_batches(mut self) -> Result<Vec<Batch>> {
        let mut batches = Vec::new();
        while let Some(item) = self.inner.next().await {
            batches.push(item?);
        }
        Ok(batches)
    }

    /// Drain every batch and flatten the documents, in emission order.
    pub async fn try_collect_docs(self) -> Result<Vec<DocResult>> {
        Ok(self
            .try_collect_batches()
            .await?
            .into_iter()
            .flatten()
            .collect())
    }
}

impl Stream for DocStream {
    type Item = Result<Batch>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for DocStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocStream").finish_non_exhaustive()
    }
}
