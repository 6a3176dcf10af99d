//! Lazy byte-chunk producers and the adapter between their two flavours.
//!
//! A body is either pulled by blocking the calling thread
//! ([`SyncByteStream`], what the host consumes) or awaited
//! ([`AsyncByteStream`], what the transport and the application speak).
//! [`ByteStream`] holds either one until the consumer decides which it needs.
//!
//! Adapters never buffer more than the chunk being handed over and never
//! touch errors: whatever the source yields is what the consumer sees.

use std::fmt;
use std::io::Read;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};

use crate::error::Error;
use crate::executor::Executor;

/// One step of a byte stream.
pub type Chunk = Result<Bytes, Error>;

const READ_CHUNK: usize = 64 * 1024;

// ── Async ─────────────────────────────────────────────────────────────────────

/// An awaitable sequence of byte chunks.
pub struct AsyncByteStream {
    inner: BoxStream<'static, Chunk>,
}

impl AsyncByteStream {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Chunk> + Send + 'static,
    {
        Self { inner: stream.boxed() }
    }

    pub fn empty() -> Self {
        Self::from_stream(stream::empty())
    }

    pub fn once(bytes: impl Into<Bytes>) -> Self {
        Self::from_stream(stream::once(futures::future::ready(Ok(bytes.into()))))
    }

    /// Re-wraps a blocking stream. Each poll pulls the next blocking chunk in
    /// place; no task or thread is involved.
    pub fn from_sync(sync: SyncByteStream) -> Self {
        Self::from_stream(stream::iter(sync))
    }

    /// Reads the whole stream into one buffer.
    pub async fn collect_bytes(mut self) -> Result<Bytes, Error> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.inner.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(buf))
    }
}

impl Stream for AsyncByteStream {
    type Item = Chunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Chunk>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl fmt::Debug for AsyncByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AsyncByteStream")
    }
}

// ── Sync ──────────────────────────────────────────────────────────────────────

type BoxIter = Box<dyn Iterator<Item = Chunk> + Send + 'static>;

/// A blocking sequence of byte chunks.
///
/// Closing releases the source immediately. It happens on [`close`], when the
/// source ends, and on drop, so abandoning the stream half-way never leaks
/// whatever the source was holding on to.
///
/// [`close`]: SyncByteStream::close
pub struct SyncByteStream {
    inner: Option<BoxIter>,
}

impl SyncByteStream {
    pub fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Chunk>,
        I::IntoIter: Send + 'static,
    {
        Self { inner: Some(Box::new(iter.into_iter())) }
    }

    pub fn empty() -> Self {
        Self::from_iter(std::iter::empty())
    }

    /// Reads `reader` in fixed-size chunks until EOF.
    pub fn from_reader<R>(mut reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        let mut done = false;
        Self::from_iter(std::iter::from_fn(move || {
            if done {
                return None;
            }
            let mut buf = vec![0; READ_CHUNK];
            match reader.read(&mut buf) {
                Ok(0) => {
                    done = true;
                    None
                }
                Ok(n) => {
                    buf.truncate(n);
                    Some(Ok(Bytes::from(buf)))
                }
                Err(e) => {
                    done = true;
                    Some(Err(Error::body(e)))
                }
            }
        }))
    }

    /// Blocks on `executor` for every chunk of `stream`.
    ///
    /// The executor is whatever drives the producer of `stream`; it stays
    /// alive exactly as long as this sync stream does.
    pub fn from_async(stream: AsyncByteStream, executor: Arc<Executor>) -> Self {
        Self::from_iter(BlockingPull { stream: Some(stream), executor })
    }

    /// Releases the underlying source. Idempotent.
    pub fn close(&mut self) {
        self.inner = None;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Reads the whole stream into one buffer.
    pub fn collect_bytes(mut self) -> Result<Bytes, Error> {
        let mut buf = Vec::new();
        for chunk in &mut self {
            buf.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(buf))
    }
}

impl Iterator for SyncByteStream {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let next = self.inner.as_mut()?.next();
        if next.is_none() {
            self.close();
        }
        next
    }
}

impl fmt::Debug for SyncByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncByteStream").field("closed", &self.is_closed()).finish()
    }
}

/// `from_async` iterator. Field order matters: the stream is dropped before
/// the executor that feeds it.
struct BlockingPull {
    stream: Option<AsyncByteStream>,
    executor: Arc<Executor>,
}

impl Iterator for BlockingPull {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let mut stream = self.stream.take()?;
        let (next, stream) = self.executor.block_on(async move {
            let next = stream.next().await;
            (next, stream)
        });
        if next.is_some() {
            self.stream = Some(stream);
        }
        next
    }
}

// ── Either ────────────────────────────────────────────────────────────────────

/// A lazy byte-chunk producer of either flavour.
#[derive(Debug)]
pub enum ByteStream {
    Blocking(SyncByteStream),
    Async(AsyncByteStream),
}

impl ByteStream {
    pub fn into_async(self) -> AsyncByteStream {
        match self {
            Self::Blocking(sync) => AsyncByteStream::from_sync(sync),
            Self::Async(stream) => stream,
        }
    }
}

impl From<Bytes> for ByteStream {
    fn from(bytes: Bytes) -> Self {
        Self::Async(AsyncByteStream::once(bytes))
    }
}

impl From<Vec<u8>> for ByteStream {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<&'static str> for ByteStream {
    fn from(s: &'static str) -> Self {
        Bytes::from_static(s.as_bytes()).into()
    }
}

impl From<SyncByteStream> for ByteStream {
    fn from(sync: SyncByteStream) -> Self {
        Self::Blocking(sync)
    }
}

impl From<AsyncByteStream> for ByteStream {
    fn from(stream: AsyncByteStream) -> Self {
        Self::Async(stream)
    }
}
