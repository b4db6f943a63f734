//! Chunk streams
//!
//! A [`ChunkStream`] is a lazy, cancellable, single-consumer sequence of
//! [`Chunk`]s. Streaming responses are produced by a reader task feeding a
//! bounded channel; closing the stream cancels the task and joins it, so no
//! chunk can be produced after `close` returns.

pub mod sse;
pub mod tool_calls;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;
use crate::types::Chunk;

pub use sse::{StreamContext, StreamDecoder, StreamUpdate, drive_sse, drive_sse_response};
pub use tool_calls::{ToolCallAccumulator, ToolCallFragment};

/// Capacity of the channel between the reader task and the consumer.
pub const STREAM_BUFFER: usize = 32;

type Item = Result<Chunk, LlmError>;

/// Producer half handed to reader tasks.
#[derive(Clone)]
pub struct ChunkSender {
    tx: mpsc::Sender<Item>,
    cancel: CancellationToken,
}

impl ChunkSender {
    /// Send one item; returns `false` once the stream was closed or cancelled.
    pub async fn send(&self, item: Item) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            res = self.tx.send(item) => res.is_ok(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Lazy sequence of response chunks.
pub struct ChunkStream {
    rx: mpsc::Receiver<Item>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    closed: bool,
}

impl std::fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream")
            .field("closed", &self.closed)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl ChunkStream {
    /// Spawn `producer` as the reader task of a new stream.
    pub fn spawn<F, Fut>(cancel: CancellationToken, producer: F) -> Self
    where
        F: FnOnce(ChunkSender) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let sender = ChunkSender {
            tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(producer(sender));
        Self {
            rx,
            cancel,
            task: Some(task),
            closed: false,
        }
    }

    /// Stream holding pre-computed items and no reader task.
    pub fn from_items(items: Vec<Item>) -> Self {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            // Capacity equals the item count.
            let _ = tx.try_send(item);
        }
        Self {
            rx,
            cancel: CancellationToken::new(),
            task: None,
            closed: false,
        }
    }

    /// Single-chunk stream used for non-streaming responses.
    pub fn from_chunk(chunk: Chunk) -> Self {
        Self::from_items(vec![Ok(chunk)])
    }

    /// Re-emit `first` followed by the rest of `inner`.
    ///
    /// Used by virtual providers that had to peek at the first chunk before committing.
    pub fn with_first(first: Item, inner: ChunkStream) -> Self {
        Self::forward(Some(first), inner, ())
    }

    /// Forward `inner` through a new stream, keeping `guard` alive until the
    /// forwarder finishes.
    ///
    /// The new stream has its own token: finishing or closing `inner` never
    /// cancels it, so chunks already handed over are still delivered. A
    /// cancellation of `inner` from outside is passed on.
    pub fn forward<G>(first: Option<Item>, mut inner: ChunkStream, guard: G) -> Self
    where
        G: Send + 'static,
    {
        let cancel = CancellationToken::new();
        let upstream = inner.cancel_token();
        Self::spawn(cancel.clone(), move |tx| async move {
            let _guard = guard;
            if let Some(first) = first
                && !tx.send(first).await
            {
                inner.close().await;
                return;
            }
            loop {
                let item = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    item = inner.next() => item,
                };
                match item {
                    Some(item) => {
                        if !tx.send(item).await {
                            break;
                        }
                    }
                    None => {
                        if upstream.is_cancelled() && !inner.is_closed() {
                            cancel.cancel();
                        }
                        break;
                    }
                }
            }
            inner.close().await;
        })
    }

    /// Next chunk, or `None` once the stream ended, was closed or was cancelled.
    pub async fn next(&mut self) -> Option<Item> {
        if self.closed || self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            item = self.rx.recv() => item,
        }
    }

    /// Close the stream and join the reader task. Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cancel.cancel();
        self.rx.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Handle that cancels this stream from elsewhere.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drain the stream and return the terminal chunk.
    pub async fn collect_response(mut self) -> Result<Chunk, LlmError> {
        let outcome = loop {
            match self.next().await {
                Some(Ok(chunk)) if chunk.done => break Ok(chunk),
                Some(Ok(_)) => continue,
                Some(Err(e)) => break Err(e),
                None if self.cancel.is_cancelled() => break Err(LlmError::cancelled()),
                None => {
                    break Err(LlmError::invalid_response(
                        "stream ended without a terminal chunk",
                    ));
                }
            }
        };
        self.close().await;
        outcome
    }

    /// Text deltas of the stream as a `futures::Stream`.
    pub fn text_deltas(mut self) -> impl Stream<Item = Result<String, LlmError>> + Send {
        async_stream::stream! {
            while let Some(item) = self.next().await {
                match item {
                    Ok(chunk) if chunk.done => break,
                    Ok(chunk) => {
                        if !chunk.content.is_empty() {
                            yield Ok(chunk.content);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
            self.close().await;
        }
    }
}

impl Stream for ChunkStream {
    type Item = Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.closed || self.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        // The reader task observes the token and releases the response body.
        self.cancel.cancel();
    }
}

static_assertions::assert_impl_all!(ChunkStream: Send, Unpin);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, ChoiceDelta};
    use futures_util::StreamExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn delta(text: &str) -> Chunk {
        Chunk::delta(
            "id",
            "m",
            ChoiceDelta {
                content: text.to_string(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn single_chunk_stream() {
        let mut s = ChunkStream::from_chunk(Chunk::complete(
            "id",
            "m",
            ChatMessage::assistant("pong"),
            None,
            None,
        ));
        let first = s.next().await.unwrap().unwrap();
        assert!(first.done);
        assert!(s.next().await.is_none());
        s.close().await;
        s.close().await;
        assert!(s.is_closed());
    }

    #[tokio::test]
    async fn close_joins_reader_task() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let mut s = ChunkStream::spawn(CancellationToken::new(), move |tx| async move {
            let mut n = 0;
            while tx.send(Ok(delta(&n.to_string()))).await {
                n += 1;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            flag.store(true, Ordering::SeqCst);
        });
        assert!(s.next().await.is_some());
        s.close().await;
        assert!(finished.load(Ordering::SeqCst));
        assert!(s.next().await.is_none());
    }

    #[tokio::test]
    async fn cancellation_stops_delivery() {
        let parent = CancellationToken::new();
        let mut s = ChunkStream::spawn(parent.child_token(), |tx| async move {
            let _ = tx.send(Ok(delta("a"))).await;
            tokio::select! {
                _ = tx.token().cancelled() => return,
                _ = tokio::time::sleep(Duration::from_secs(30)) => {}
            }
            let _ = tx.send(Ok(delta("b"))).await;
        });
        assert_eq!(s.next().await.unwrap().unwrap().content, "a");
        parent.cancel();
        assert!(s.next().await.is_none());
        tokio::time::timeout(Duration::from_secs(1), s.close())
            .await
            .expect("close returns promptly");
    }

    #[tokio::test]
    async fn with_first_replays_peeked_chunk() {
        let inner = ChunkStream::from_items(vec![Ok(delta("b")), Ok(delta("c"))]);
        let s = ChunkStream::with_first(Ok(delta("a")), inner);
        let texts: Vec<String> = s.map(|c| c.unwrap().content).collect().await;
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn forwarded_single_chunk_survives_inner_close() {
        let inner = ChunkStream::from_chunk(Chunk::complete(
            "id",
            "m",
            ChatMessage::assistant("whole answer"),
            Some("stop".into()),
            None,
        ));
        let done = ChunkStream::forward(None, inner, ())
            .collect_response()
            .await
            .unwrap();
        assert_eq!(done.content, "whole answer");
    }

    #[tokio::test]
    async fn forwarded_stream_reports_upstream_cancellation() {
        let parent = CancellationToken::new();
        let inner = ChunkStream::spawn(parent.child_token(), |tx| async move {
            let _ = tx.send(Ok(delta("a"))).await;
            tx.token().cancelled().await;
        });
        let mut outer = ChunkStream::forward(None, inner, ());
        assert_eq!(outer.next().await.unwrap().unwrap().content, "a");
        parent.cancel();
        let err = tokio::time::timeout(Duration::from_secs(1), outer.collect_response())
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn collect_and_text_deltas() {
        let mut terminal = delta("");
        terminal.done = true;
        terminal.content = "Hello!".into();
        let items = vec![Ok(delta("Hel")), Ok(delta("lo!")), Ok(terminal.clone())];

        let done = ChunkStream::from_items(items.clone())
            .collect_response()
            .await
            .unwrap();
        assert_eq!(done.content, "Hello!");

        let texts: Vec<String> = ChunkStream::from_items(items)
            .text_deltas()
            .map(|t| t.unwrap())
            .collect()
            .await;
        assert_eq!(texts.concat(), "Hello!");
    }

    #[tokio::test]
    async fn collect_without_terminal_is_an_error() {
        let err = ChunkStream::from_items(vec![Ok(delta("x"))])
            .collect_response()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidResponse);
    }
}
