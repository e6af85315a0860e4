//! Recorder events and their dispatch.
//!
//! Subscribers receive events over unbounded tokio channels. The bus
//! tracks which event kinds each subscriber asked for, so the driver can
//! ask [`EventBus::has_subscribers`] before doing work whose only output
//! is an event nobody would receive.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::RecorderError;
use crate::mime::MimeType;
use crate::state::Operation;

// ── Event types ──────────────────────────────────────────────────

/// Discriminant of [`RecorderEvent`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Start,
    Stop,
    Pause,
    Resume,
    DataAvailable,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Start,
        EventKind::Stop,
        EventKind::Pause,
        EventKind::Resume,
        EventKind::DataAvailable,
        EventKind::Error,
    ];
}

/// An admitted frame.
#[derive(Debug, Clone)]
pub struct BlobEvent {
    /// Compressed frame bytes.
    pub data: Bytes,
    pub mime_type: MimeType,
    /// Zero-based index among the frames emitted since `start`.
    pub sequence: u64,
    /// Capture time elapsed since `start`.
    pub timecode: Duration,
    /// Bitrate estimate the frame was admitted under, if one existed.
    pub bits_per_second: Option<f64>,
}

/// A failed operation or capture cycle.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    /// The call (or timer tick) that failed.
    pub operation: Operation,
    pub error: Arc<RecorderError>,
}

impl ErrorEvent {
    pub fn new(operation: Operation, error: RecorderError) -> Self {
        Self {
            operation,
            error: Arc::new(error),
        }
    }

    pub fn is_invalid_state(&self) -> bool {
        self.error.is_invalid_state()
    }
}

#[derive(Debug, Clone)]
pub enum RecorderEvent {
    Start,
    Stop,
    Pause,
    Resume,
    DataAvailable(BlobEvent),
    Error(ErrorEvent),
}

impl RecorderEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Start => EventKind::Start,
            Self::Stop => EventKind::Stop,
            Self::Pause => EventKind::Pause,
            Self::Resume => EventKind::Resume,
            Self::DataAvailable(_) => EventKind::DataAvailable,
            Self::Error(_) => EventKind::Error,
        }
    }
}

// ── Subscription ─────────────────────────────────────────────────

/// Receiving half of a subscription.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<RecorderEvent>,
}

impl EventStream {
    /// Next event, or `None` once the recorder has shut down.
    pub async fn recv(&mut self) -> Option<RecorderEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<RecorderEvent> {
        self.rx.try_recv().ok()
    }
}

/// Sending half, handed to the bus.
#[derive(Debug)]
pub struct Subscriber {
    kinds: Vec<EventKind>,
    tx: mpsc::UnboundedSender<RecorderEvent>,
}

/// Create a linked subscriber/stream pair listening for `kinds`.
pub fn subscription(kinds: &[EventKind]) -> (Subscriber, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Subscriber {
            kinds: kinds.to_vec(),
            tx,
        },
        EventStream { rx },
    )
}

impl Subscriber {
    fn wants(&self, kind: EventKind) -> bool {
        !self.tx.is_closed() && self.kinds.contains(&kind)
    }
}

// ── EventBus ─────────────────────────────────────────────────────

/// Fan-out of recorder events to every interested subscriber.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subscriber: Subscriber) {
        self.subscribers.push(subscriber);
    }

    /// Deliver `event` to every live subscriber of its kind, dropping
    /// subscribers whose stream has gone away.
    pub fn dispatch(&mut self, event: RecorderEvent) {
        let kind = event.kind();
        self.subscribers.retain(|s| !s.tx.is_closed());
        for sub in self.subscribers.iter().filter(|s| s.kinds.contains(&kind)) {
            let _ = sub.tx.send(event.clone());
        }
    }

    /// Live subscribers for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers.iter().filter(|s| s.wants(kind)).count()
    }

    pub fn has_subscribers(&self, kind: EventKind) -> bool {
        self.subscribers.iter().any(|s| s.wants(kind))
    }
}

// ── Tests ────────────────────────────────────────────────────────
