// Capture module - copies request and response bodies off the wire
//
// The capture shim sits between the host's HTTP client and the network. It
// keeps its own copy of every byte it sees and hands the complete body to the
// pipeline once, without changing what the host sends or receives.

pub mod client;

pub use client::InspectingClient;

use bytes::{Bytes, BytesMut};
use futures::Stream;
use http_body::{Frame, SizeHint};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};

/// Ordered copy of the chunks seen for one body
#[derive(Debug, Default)]
pub struct CaptureBuffer {
    chunks: Vec<Bytes>,
    len: usize,
}

impl CaptureBuffer {
    pub fn record(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push(chunk);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Concatenate everything recorded; `None` if nothing was
    pub fn finish(self) -> Option<Bytes> {
        match self.chunks.len() {
            0 => None,
            1 => self.chunks.into_iter().next(),
            _ => {
                let mut body = BytesMut::with_capacity(self.len);
                for chunk in &self.chunks {
                    body.extend_from_slice(chunk);
                }
                Some(body.freeze())
            }
        }
    }
}

/// Called once with the full body when a teed stream ends cleanly
pub type OnComplete = Box<dyn FnOnce(Bytes) + Send>;

type BoxedByteStream<E> = Pin<Box<dyn Stream<Item = Result<Bytes, E>> + Send>>;

/// Passes a byte stream through untouched while keeping a copy
///
/// Every chunk is recorded in the same poll that yields it, so ordering and
/// backpressure belong to the consumer. The completion callback fires at a
/// clean end of stream, or as soon as `declared_len` bytes have passed: a
/// consumer that honors Content-Length stops polling after the last byte and
/// never sees the end. An error or an early drop discards the copy.
pub struct TeeStream<E> {
    inner: BoxedByteStream<E>,
    buffer: CaptureBuffer,
    declared_len: Option<u64>,
    on_complete: Option<OnComplete>,
}

impl<E> TeeStream<E> {
    pub fn new<S>(inner: S, declared_len: Option<u64>, on_complete: OnComplete) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    {
        Self {
            inner: Box::pin(inner),
            buffer: CaptureBuffer::default(),
            declared_len,
            on_complete: Some(on_complete),
        }
    }

    /// Hand the captured body to the callback, at most once
    fn complete(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            let body = std::mem::take(&mut self.buffer).finish().unwrap_or_default();
            shielded("response capture", move || on_complete(body));
        }
    }

    fn reached_declared_len(&self) -> bool {
        self.declared_len
            .is_some_and(|declared| self.buffer.len() as u64 >= declared)
    }
}

impl<E> Stream for TeeStream<E> {
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if this.on_complete.is_some() {
                    this.buffer.record(chunk.clone());
                    if this.reached_declared_len() {
                        this.complete();
                    }
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                if this.on_complete.take().is_some() {
                    tracing::debug!(
                        captured = this.buffer.len(),
                        "Response stream failed, capture discarded"
                    );
                }
                this.buffer = CaptureBuffer::default();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.complete();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// HTTP body over a [`TeeStream`] that keeps the exact length known upstream
///
/// The mutex only makes the body `Sync`; it is reached through `&mut self`
/// and never locked.
pub struct TeeBody<E> {
    stream: Mutex<TeeStream<E>>,
    exact_len: Option<u64>,
}

impl<E> TeeBody<E> {
    pub fn new(stream: TeeStream<E>, exact_len: Option<u64>) -> Self {
        Self {
            stream: Mutex::new(stream),
            exact_len,
        }
    }
}

impl<E> http_body::Body for TeeBody<E> {
    type Data = Bytes;
    type Error = E;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, E>>> {
        let stream = self
            .get_mut()
            .stream
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        Pin::new(stream)
            .poll_next(cx)
            .map(|item| item.map(|chunk| chunk.map(Frame::data)))
    }

    fn size_hint(&self) -> SizeHint {
        match self.exact_len {
            Some(len) => SizeHint::with_exact(len),
            None => SizeHint::default(),
        }
    }
}

/// Run an inspector side effect, containing any panic it raises
///
/// The host's call must complete the same way with or without the inspector.
pub(crate) fn shielded(what: &str, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::warn!(what, panic = %message, "Inspector capture failed, call unaffected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{stream, StreamExt};
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<Bytes>>>;

    fn recorder() -> (Captured, OnComplete) {
        let captured: Captured = Arc::default();
        let sink = captured.clone();
        (captured, Box::new(move |body| sink.lock().unwrap().push(body)))
    }

    #[tokio::test]
    async fn test_tee_passes_chunks_through_and_reports_once() {
        let chunks = vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"{\"a\":")),
            Ok(Bytes::from_static(b"")),
            Ok(Bytes::from_static(b"1}")),
        ];
        let (captured, on_complete) = recorder();
        let tee = TeeStream::new(stream::iter(chunks), None, on_complete);

        let seen: Vec<Bytes> = tee.map(|chunk| chunk.unwrap()).collect().await;
        assert_eq!(seen, vec![Bytes::from_static(b"{\"a\":"), Bytes::new(), Bytes::from_static(b"1}")]);

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(&captured[0][..], b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_tee_reports_nothing_before_end() {
        let (captured, on_complete) = recorder();
        let mut tee = TeeStream::new(
            stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"x"))]),
            None,
            on_complete,
        );
        assert!(tee.next().await.is_some());
        assert!(captured.lock().unwrap().is_empty());
        assert!(tee.next().await.is_none());
        assert_eq!(captured.lock().unwrap().len(), 1);
        // Polling past the end does not report again
        assert!(tee.next().await.is_none());
        assert_eq!(captured.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tee_error_discards_capture() {
        let chunks = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("reset")),
        ];
        let (captured, on_complete) = recorder();
        let tee = TeeStream::new(stream::iter(chunks), None, on_complete);

        let results: Vec<_> = tee.collect().await;
        assert!(results[1].is_err());
        assert!(captured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tee_early_drop_reports_nothing() {
        let (captured, on_complete) = recorder();
        let mut tee = TeeStream::new(
            stream::iter(vec![
                Ok::<_, std::io::Error>(Bytes::from_static(b"a")),
                Ok(Bytes::from_static(b"b")),
            ]),
            None,
            on_complete,
        );
        let _ = tee.next().await;
        drop(tee);
        assert!(captured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tee_reports_at_declared_length_without_end() {
        let (captured, on_complete) = recorder();
        // A pending tail stands in for a connection the consumer stops reading
        let chunks = stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"{\"a\"")),
            Ok(Bytes::from_static(b":1}")),
        ])
        .chain(stream::pending());
        let mut tee = TeeStream::new(chunks, Some(7), on_complete);

        assert!(tee.next().await.is_some());
        assert!(captured.lock().unwrap().is_empty());
        assert!(tee.next().await.is_some());

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(&captured[0][..], b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_tee_declared_length_reports_once() {
        let (captured, on_complete) = recorder();
        let tee = TeeStream::new(
            stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"abc"))]),
            Some(3),
            on_complete,
        );
        let _: Vec<_> = tee.collect().await;
        assert_eq!(captured.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_tee_body_reports_exact_size() {
        use http_body::Body as _;

        let (_, on_complete) = recorder();
        let tee = TeeStream::new(stream::empty::<Result<Bytes, std::io::Error>>(), Some(42), on_complete);
        assert_eq!(TeeBody::new(tee, Some(42)).size_hint().exact(), Some(42));

        let (_, on_complete) = recorder();
        let tee = TeeStream::new(stream::empty::<Result<Bytes, std::io::Error>>(), None, on_complete);
        assert_eq!(TeeBody::new(tee, None).size_hint().exact(), None);
    }

    #[test]
    fn test_capture_buffer_concatenates_in_order() {
        let mut buffer = CaptureBuffer::default();
        assert!(buffer.is_empty());
        buffer.record(Bytes::from_static(b"ab"));
        buffer.record(Bytes::from_static(b"cd"));
        assert_eq!(buffer.len(), 4);
        assert_eq!(&buffer.finish().unwrap()[..], b"abcd");
        assert!(CaptureBuffer::default().finish().is_none());
    }

    #[test]
    fn test_shielded_contains_panics() {
        shielded("test", || panic!("boom"));
    }
}
