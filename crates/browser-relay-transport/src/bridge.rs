//! Bridges a streamed task result onto a long-lived response.
//!
//! The bridge interleaves data units with periodic empty heartbeats so idle
//! responses are not closed by intermediaries, and always ends with a
//! [`BridgeUnit::Done`] unit, whether the stream succeeded or not.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use browser_relay_core::FetchCommand;
use browser_relay_session::RelayManager;
use futures::{
    StreamExt,
    stream::{self, BoxStream, Stream},
};
use serde_json::Value;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, interval_at},
};
use tokio_stream::wrappers::{IntervalStream, UnboundedReceiverStream};

/// Terminal marker sent to the consumer.
pub const DONE_MARKER: &str = "[DONE]";

/// One outward unit of a bridged stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeUnit {
    Data(String),
    Heartbeat,
    Done,
}

impl BridgeUnit {
    /// Text carried by this unit.
    #[must_use]
    pub fn data(&self) -> &str {
        match self {
            Self::Data(data) => data,
            Self::Heartbeat => "",
            Self::Done => DONE_MARKER,
        }
    }

    /// Server-sent event carrying this unit.
    #[cfg(feature = "sse")]
    #[must_use]
    pub fn to_sse_event(&self) -> axum::response::sse::Event {
        // Event::data rejects carriage returns.
        axum::response::sse::Event::default().data(self.data().replace('\r', ""))
    }
}

/// Forwards chunks from a producer into its bridge.
#[derive(Debug, Clone)]
pub struct ChunkSender {
    tx: mpsc::UnboundedSender<BridgeUnit>,
}

impl ChunkSender {
    /// Forward one chunk. Strings pass through raw, other values as JSON.
    pub fn send(&self, chunk: Value) {
        let data = match chunk {
            Value::String(s) => s,
            other => other.to_string(),
        };
        if self.tx.send(BridgeUnit::Data(data)).is_err() {
            tracing::debug!("Bridge consumer gone, dropping chunk");
        }
    }
}

/// Merged sequence of data units and heartbeats, ending with `Done`.
///
/// Dropping the bridge cancels the producer.
pub struct StreamBridge {
    inner: BoxStream<'static, BridgeUnit>,
    finished: bool,
    task: JoinHandle<()>,
}

impl StreamBridge {
    /// Spawn `producer` and bridge the chunks it sends.
    ///
    /// The producer is cut off after `max_duration`; `Done` follows either way.
    pub fn new<F, Fut>(heartbeat: Duration, max_duration: Duration, producer: F) -> Self
    where
        F: FnOnce(ChunkSender) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let work = producer(ChunkSender { tx: tx.clone() });
        let task = tokio::spawn(async move {
            if tokio::time::timeout(max_duration, work).await.is_err() {
                tracing::warn!("Stream exceeded {max_duration:?}, closing");
            }
            let _ = tx.send(BridgeUnit::Done);
        });

        // The trailing Done covers a producer that panicked.
        let data = UnboundedReceiverStream::new(rx).chain(stream::once(async { BridgeUnit::Done }));
        let heartbeats = IntervalStream::new(interval_at(Instant::now() + heartbeat, heartbeat))
            .map(|_| BridgeUnit::Heartbeat);

        Self {
            inner: stream::select(data, heartbeats).boxed(),
            finished: false,
            task,
        }
    }

    /// Stream a fetch through `manager`, bounded by its configured limits.
    pub fn fetch(manager: Arc<RelayManager>, command: FetchCommand) -> Self {
        let heartbeat = manager.config().heartbeat();
        let max_duration = manager.config().stream_max_duration();
        Self::new(heartbeat, max_duration, move |chunks| async move {
            let result = manager
                .execute_stream(command, |chunk| chunks.send(chunk))
                .await;
            if let Err(e) = result {
                tracing::warn!("Stream ended early: {e}");
            }
        })
    }

    /// Server-sent event stream for this bridge.
    #[cfg(feature = "sse")]
    pub fn into_sse(
        self,
    ) -> impl Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>> {
        self.map(|unit| Ok(unit.to_sse_event()))
    }
}

impl Stream for StreamBridge {
    type Item = BridgeUnit;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        let next = self.inner.poll_next_unpin(cx);
        if let Poll::Ready(Some(BridgeUnit::Done) | None) = next {
            self.finished = true;
            self.task.abort();
        }
        next
    }
}

impl Drop for StreamBridge {
    fn drop(&mut self) {
        self.task.abort();
    }
}
