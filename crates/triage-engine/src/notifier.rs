//! # Change Notifier
//!
//! Fan-out of queue and staff change events to live observers (dashboards,
//! SSE clients). Delivery is best effort and never blocks or fails the write
//! that produced the event:
//!
//! - each observer owns a bounded channel; when it is full the event is
//!   dropped for that observer only
//! - observers whose receiver was dropped are removed on the next broadcast;
//!   an [`ObserverStream`] unsubscribes as soon as it is dropped
//!
//! Events serialize as `{"type": "queue_updated", "data": {...}}`.
//!
//! Events are sent after the commit, so two concurrent writes to the same entry
//! may be announced in either order. Entry payloads carry `version`: observers
//! should keep the event with the highest version for each entry id.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use dashmap::DashMap;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Observer registration handle
pub type ObserverId = u64;

/// Kind of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueEventKind {
    QueueUpdated,
    QueueCompleted,
    StaffUpdated,
}

impl QueueEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueEventKind::QueueUpdated => "queue_updated",
            QueueEventKind::QueueCompleted => "queue_completed",
            QueueEventKind::StaffUpdated => "staff_updated",
        }
    }
}

/// Change event delivered to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEvent {
    #[serde(rename = "type")]
    pub kind: QueueEventKind,
    pub data: serde_json::Value,
}

impl QueueEvent {
    pub fn new(kind: QueueEventKind, data: serde_json::Value) -> Self {
        Self { kind, data }
    }

    /// Build an event from any serializable payload; unserializable payloads become null
    pub fn from_payload<T: Serialize>(kind: QueueEventKind, payload: &T) -> Self {
        let data = serde_json::to_value(payload).unwrap_or_else(|e| {
            warn!("Failed to serialize {:?} event payload: {}", kind, e);
            serde_json::Value::Null
        });
        Self { kind, data }
    }
}

/// Registered observers and their channels
#[derive(Clone)]
pub struct ChangeNotifier {
    observers: Arc<DashMap<ObserverId, mpsc::Sender<QueueEvent>>>,
    next_id: Arc<AtomicU64>,
    buffer: usize,
}

/// Receiving side of a subscription
pub struct Observer {
    pub id: ObserverId,
    pub receiver: mpsc::Receiver<QueueEvent>,
}

impl ChangeNotifier {
    /// Create a notifier whose observers buffer up to `buffer` events each
    pub fn new(buffer: usize) -> Self {
        Self {
            observers: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            buffer: buffer.max(1),
        }
    }

    /// Register a new observer
    pub fn subscribe(&self) -> Observer {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.insert(id, tx);

        debug!("👀 Observer {} subscribed ({} total)", id, self.observers.len());
        Observer { id, receiver: rx }
    }

    /// Register a new observer as a stream that unsubscribes when dropped
    pub fn stream(&self) -> ObserverStream {
        let observer = self.subscribe();
        ObserverStream {
            id: observer.id,
            events: ReceiverStream::new(observer.receiver),
            notifier: self.clone(),
        }
    }

    /// Remove an observer; unknown ids are ignored
    pub fn unsubscribe(&self, id: ObserverId) {
        if self.observers.remove(&id).is_some() {
            debug!("Observer {} unsubscribed", id);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Deliver `event` to every observer without waiting
    pub fn broadcast(&self, event: QueueEvent) {
        let mut closed = Vec::new();

        for observer in self.observers.iter() {
            match observer.value().try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Observer {} is lagging, dropped {:?} event", observer.key(), event.kind);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*observer.key()),
            }
        }

        // Removal happens after iteration; DashMap shards stay locked while iterating
        for id in closed {
            self.observers.remove(&id);
            debug!("Observer {} disconnected", id);
        }
    }
}

/// Observer as a [`Stream`] of events, for long-lived consumers such as SSE
pub struct ObserverStream {
    id: ObserverId,
    events: ReceiverStream<QueueEvent>,
    notifier: ChangeNotifier,
}

impl ObserverStream {
    pub fn id(&self) -> ObserverId {
        self.id
    }
}

impl Stream for ObserverStream {
    type Item = QueueEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl Drop for ObserverStream {
    fn drop(&mut self) {
        self.notifier.unsubscribe(self.id);
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}
