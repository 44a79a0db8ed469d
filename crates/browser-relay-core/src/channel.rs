//! Ordered outbound message channel, one per agent connection.

use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::Envelope;

/// Identifier of one physical agent connection.
pub type ConnectionId = Uuid;

/// Frame handed to the physical connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Text frame, delivered verbatim.
    Text(String),
    /// Close the connection after everything queued before it.
    Close,
}

/// Channel error.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel closed")]
    Closed,
    #[error("Channel already has a subscriber")]
    AlreadySubscribed,
    #[error("Failed to serialize envelope: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Outbound queue feeding one agent connection.
///
/// Sends never block: frames queue in an unbounded buffer until the
/// connection writer drains them. Frames queued before `subscribe` are kept,
/// so replies produced while handling the first inbound frame are not lost.
pub struct MessageChannel {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<Outbound>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Outbound>>>,
    closed: AtomicBool,
}

impl MessageChannel {
    /// Create a channel for the given connection.
    #[must_use]
    pub fn new(id: ConnectionId) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            id,
            sender,
            receiver: Mutex::new(Some(receiver)),
            closed: AtomicBool::new(false),
        }
    }

    /// Connection this channel belongs to.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a text frame, logging instead of failing.
    pub fn send(&self, frame: impl Into<String>) {
        let frame = frame.into();
        if let Err(e) = self.try_send(frame.clone()) {
            tracing::error!(connection = %self.id, "Failed to send message: {e}, {frame}");
        }
    }

    /// Queue a text frame.
    ///
    /// # Errors
    /// Returns error if the channel was closed or its subscriber is gone.
    pub fn try_send(&self, frame: impl Into<String>) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }
        self.sender
            .send(Outbound::Text(frame.into()))
            .map_err(|_| ChannelError::Closed)
    }

    /// Serialize and queue an envelope.
    ///
    /// # Errors
    /// Returns error if serialization fails or the channel is closed.
    pub fn send_envelope(&self, envelope: &Envelope) -> Result<(), ChannelError> {
        let json = serde_json::to_string(envelope)?;
        self.try_send(json)
    }

    /// Take the outbound frame sequence.
    ///
    /// # Errors
    /// Returns error if the sequence was already taken.
    pub fn subscribe(&self) -> Result<UnboundedReceiverStream<Outbound>, ChannelError> {
        self.receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(UnboundedReceiverStream::new)
            .ok_or(ChannelError::AlreadySubscribed)
    }

    /// Queue a close frame and reject further sends. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.sender.send(Outbound::Close);
        }
    }

    /// Whether frames can still be queued.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && !self.sender.is_closed()
    }
}

impl std::fmt::Debug for MessageChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageChannel")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
