//! Incremental generation output.
//!
//! [`TokenStream`] is a finite, non-restartable, pull-based sequence of text
//! fragments. Providers feed it from a spawned task that reads the HTTP body
//! line by line; the consumer pulls with [`TokenStream::next_fragment`] or via
//! the [`futures::Stream`] impl.
//!
//! Lifecycle: `Open` → `Completed` | `Failed` | `Cancelled`. Once left, `Open`
//! is never re-entered and the stream yields nothing more. Cancelling (or
//! dropping) an open stream aborts the producer task, which drops the
//! underlying response and closes the connection.

use std::ops::ControlFlow;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::llm_provider::LlmProvider;
use crate::error_handler::{AiLlmError, ProviderError, ProviderErrorKind};

/// One pulled item: a text fragment or the error that ended the stream.
pub type Fragment = Result<String, AiLlmError>;

/// Channel capacity between producer task and consumer.
const FRAGMENT_BUFFER: usize = 64;

/// Observable state of a [`TokenStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// More fragments may arrive.
    Open,
    /// The producer finished normally; every fragment was delivered.
    Completed,
    /// The consumer cancelled; remaining output was discarded.
    Cancelled,
    /// The producer reported an error; already delivered fragments stand.
    Failed,
}

/// Lazy sequence of generated text fragments.
pub struct TokenStream {
    rx: mpsc::Receiver<Fragment>,
    producer: Option<JoinHandle<()>>,
    state: StreamState,
}

impl TokenStream {
    /// Creates a stream fed by the returned sender. The stream completes once
    /// every sender is dropped.
    pub fn channel(buffer: usize) -> (mpsc::Sender<Fragment>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            tx,
            Self {
                rx,
                producer: None,
                state: StreamState::Open,
            },
        )
    }

    /// Builds an already-filled stream. No task is spawned.
    pub fn from_fragments<I>(fragments: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let items: Vec<String> = fragments.into_iter().collect();
        let (tx, stream) = Self::channel(items.len());
        for item in items {
            // Capacity equals the item count, so this cannot fail.
            let _ = tx.try_send(Ok(item));
        }
        stream
    }

    /// Ties a producer task to this stream so that cancellation aborts it.
    pub fn with_producer(mut self, handle: JoinHandle<()>) -> Self {
        self.producer = Some(handle);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Pulls the next fragment; `None` once the stream left `Open`.
    pub async fn next_fragment(&mut self) -> Option<Fragment> {
        self.next().await
    }

    /// Stops the stream and releases the producer. No-op unless `Open`.
    pub fn cancel(&mut self) {
        if self.state != StreamState::Open {
            return;
        }
        debug!("token stream cancelled by consumer");
        self.state = StreamState::Cancelled;
        self.release();
    }

    /// Drains the stream into one string.
    ///
    /// # Errors
    /// Returns the first error reported by the producer.
    pub async fn collect_text(mut self) -> Result<String, AiLlmError> {
        let mut out = String::new();
        while let Some(fragment) = self.next_fragment().await {
            out.push_str(&fragment?);
        }
        Ok(out)
    }

    fn release(&mut self) {
        self.rx.close();
        if let Some(handle) = self.producer.take() {
            handle.abort();
        }
    }
}

impl Stream for TokenStream {
    type Item = Fragment;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.state != StreamState::Open {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(text))) => Poll::Ready(Some(Ok(text))),
            Poll::Ready(Some(Err(err))) => {
                this.state = StreamState::Failed;
                this.release();
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.state = StreamState::Completed;
                this.producer = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for TokenStream {
    fn drop(&mut self) {
        if let Some(handle) = self.producer.take() {
            handle.abort();
        }
    }
}

/* ------------------------------------------------------------------------- */
/* Line-oriented producers (NDJSON / SSE bodies)                              */
/* ------------------------------------------------------------------------- */

/// Result of parsing one body line.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LineEvent {
    Fragment(String),
    /// Final fragment carried by the provider's end marker.
    Last(String),
    Skip,
    Done,
}

/// Splits a byte stream into lines without breaking multi-byte characters.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Appends bytes and returns every completed line (without `\n`/`\r\n`).
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.buf[start..].iter().position(|b| *b == b'\n') {
            let end = start + pos;
            let mut line = &self.buf[start..end];
            if let [head @ .., b'\r'] = line {
                line = head;
            }
            lines.push(String::from_utf8_lossy(line).into_owned());
            start = end + 1;
        }
        self.buf.drain(..start);
        lines
    }

    /// Returns the trailing partial line, if any.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let line = String::from_utf8_lossy(&rest).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

/// Spawns a task that reads `response` line by line, maps every line through
/// `parse` and forwards fragments to the returned stream.
///
/// A body that ends before `parse` reported the provider's end marker
/// (`Done` or `Last`) fails the stream.
pub(crate) fn spawn_line_stream<F>(
    response: reqwest::Response,
    provider: LlmProvider,
    mut parse: F,
) -> TokenStream
where
    F: FnMut(&str) -> Result<LineEvent, ProviderError> + Send + 'static,
{
    let (tx, stream) = TokenStream::channel(FRAGMENT_BUFFER);

    let handle = tokio::spawn(async move {
        let mut body = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut delivered = 0usize;

        while let Some(item) = body.next().await {
            let bytes = match item {
                Ok(bytes) => bytes,
                Err(err) => {
                    let _ = tx.send(Err(err.into())).await;
                    return;
                }
            };
            for line in lines.push(&bytes) {
                if dispatch(&line, &mut parse, &tx, &mut delivered).await.is_break() {
                    return;
                }
            }
        }
        if let Some(line) = lines.finish() {
            if dispatch(&line, &mut parse, &tx, &mut delivered).await.is_break() {
                return;
            }
        }
        warn!(%provider, delivered, "stream body ended before completion marker");
        let truncated = ProviderError::new(
            provider,
            ProviderErrorKind::Decode("stream ended before completion".into()),
        );
        let _ = tx.send(Err(truncated.into())).await;
    });

    stream.with_producer(handle)
}

async fn dispatch<F>(
    line: &str,
    parse: &mut F,
    tx: &mpsc::Sender<Fragment>,
    delivered: &mut usize,
) -> ControlFlow<()>
where
    F: FnMut(&str) -> Result<LineEvent, ProviderError>,
{
    match parse(line) {
        Ok(LineEvent::Fragment(text)) => {
            if text.is_empty() {
                return ControlFlow::Continue(());
            }
            *delivered += 1;
            // A closed channel means the consumer went away.
            if tx.send(Ok(text)).await.is_err() {
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        }
        Ok(LineEvent::Last(text)) => {
            if !text.is_empty() {
                *delivered += 1;
                let _ = tx.send(Ok(text)).await;
            }
            trace!(delivered = *delivered, "stream completion marker");
            ControlFlow::Break(())
        }
        Ok(LineEvent::Skip) => ControlFlow::Continue(()),
        Ok(LineEvent::Done) => {
            trace!(delivered = *delivered, "stream completion marker");
            ControlFlow::Break(())
        }
        Err(err) => {
            let _ = tx.send(Err(err.into())).await;
            ControlFlow::Break(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_buffer_handles_split_lines_and_utf8() {
        let mut lb = LineBuffer::default();
        let text = "héllo\r\nwörld\npartial";
        let bytes = text.as_bytes();
        // Split inside the two-byte 'é'.
        let cut = 2;
        let mut lines = lb.push(&bytes[..cut]);
        assert!(lines.is_empty());
        lines.extend(lb.push(&bytes[cut..]));
        assert_eq!(lines, vec!["héllo".to_string(), "wörld".to_string()]);
        assert_eq!(lb.finish().as_deref(), Some("partial"));
        assert_eq!(lb.finish(), None);
    }

    #[test]
    fn line_buffer_splits_many_lines_in_one_frame() {
        let mut lb = LineBuffer::default();
        let frame: String = (0..500).map(|i| format!("line {i}\n")).collect();
        let lines = lb.push(format!("{frame}tail").as_bytes());
        assert_eq!(lines.len(), 500);
        assert_eq!(lines[0], "line 0");
        assert_eq!(lines[499], "line 499");
        assert_eq!(lb.push(b" end\r\n"), vec!["tail end".to_string()]);
        assert_eq!(lb.finish(), None);
    }

    #[tokio::test]
    async fn from_fragments_completes_and_is_not_restartable() {
        let mut s = TokenStream::from_fragments(vec!["a".into(), "b".into()]);
        assert_eq!(s.state(), StreamState::Open);
        assert_eq!(s.next_fragment().await.unwrap().unwrap(), "a");
        assert_eq!(s.next_fragment().await.unwrap().unwrap(), "b");
        assert!(s.next_fragment().await.is_none());
        assert_eq!(s.state(), StreamState::Completed);
        assert!(s.next_fragment().await.is_none());
    }

    #[tokio::test]
    async fn cancel_stops_delivery_and_aborts_producer() {
        let (tx, stream) = TokenStream::channel(4);
        let producer = tokio::spawn(async move {
            let mut i = 0u32;
            loop {
                if tx.send(Ok(format!("t{i}"))).await.is_err() {
                    break;
                }
                i += 1;
            }
        });
        let producer_handle = producer.abort_handle();
        let mut stream = stream.with_producer(producer);

        assert_eq!(stream.next_fragment().await.unwrap().unwrap(), "t0");
        stream.cancel();
        assert_eq!(stream.state(), StreamState::Cancelled);
        assert!(stream.next_fragment().await.is_none());

        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(producer_handle.is_finished());
    }

    #[tokio::test]
    async fn error_moves_stream_to_failed_after_partial_output() {
        let (tx, mut stream) = TokenStream::channel(4);
        tx.send(Ok("partial ".into())).await.unwrap();
        tx.send(Err(ProviderError::new(
            LlmProvider::Ollama,
            ProviderErrorKind::Decode("bad line".into()),
        )
        .into()))
            .await
            .unwrap();
        drop(tx);

        assert_eq!(stream.next_fragment().await.unwrap().unwrap(), "partial ");
        assert!(stream.next_fragment().await.unwrap().is_err());
        assert_eq!(stream.state(), StreamState::Failed);
        assert!(stream.next_fragment().await.is_none());
    }

    #[tokio::test]
    async fn collect_text_concatenates_in_order() {
        let s = TokenStream::from_fragments(vec!["Hel".into(), "lo".into(), "!".into()]);
        assert_eq!(s.collect_text().await.unwrap(), "Hello!");
    }
}
