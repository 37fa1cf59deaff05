//! In-process event hub with lossy fan-out to live SSE subscribers.
//!
//! Every subscriber owns a bounded queue; a slow consumer drops events
//! instead of blocking the pipeline and is expected to reconnect and
//! catch up through the read API.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use log::{debug, info};
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::shared::state::AppState;

const SUBSCRIBER_QUEUE_SIZE: usize = 32;

#[derive(Debug, Clone, Serialize)]
pub struct TicketEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub ticket_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
}

impl TicketEvent {
    pub fn ticket_update(ticket_id: Uuid, status: &str) -> Self {
        Self {
            event_type: "ticket_update".to_string(),
            ticket_id: ticket_id.to_string(),
            status: status.to_string(),
            manager: None,
        }
    }

    pub fn with_manager(mut self, manager: &str) -> Self {
        self.manager = Some(manager.to_string());
        self
    }
}

/// Hub of live subscribers. Constructed per process and passed in as a
/// dependency so tests can run isolated hubs.
#[derive(Default)]
pub struct EventHub {
    subscribers: RwLock<HashMap<u64, mpsc::Sender<String>>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> (u64, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_SIZE);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .expect("event hub lock poisoned")
            .insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers
            .write()
            .expect("event hub lock poisoned")
            .remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .expect("event hub lock poisoned")
            .len()
    }

    /// Serialize once and offer the payload to every subscriber without
    /// blocking. Full queues drop the event; closed queues are pruned.
    pub fn broadcast(&self, event: &TicketEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(_) => return,
        };

        let mut dead = Vec::new();
        {
            let subscribers = self.subscribers.read().expect("event hub lock poisoned");
            for (id, tx) in subscribers.iter() {
                match tx.try_send(payload.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!("subscriber {} queue full, dropping event", id);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*id),
                }
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write().expect("event hub lock poisoned");
            for id in dead {
                subscribers.remove(&id);
            }
        }
    }
}

/// SSE stream of ticket state transitions. No replay; a reconnecting
/// client re-reads current state through the ticket API.
pub async fn events_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (id, rx) = state.events.subscribe();
    info!("SSE subscriber {} connected", id);

    let connected = futures::stream::once(async {
        Ok::<_, Infallible>(Event::default().data("{\"type\":\"connected\"}"))
    });
    let updates = ReceiverStream::new(rx).map(|payload| Ok(Event::default().data(payload)));

    Sse::new(connected.chain(updates)).keep_alive(KeepAlive::default())
}

pub fn configure_events_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/events", get(events_stream))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_delivers_exact_json() {
        let hub = EventHub::new();
        let (_id, mut rx) = hub.subscribe();

        let event = TicketEvent::ticket_update(Uuid::nil(), "enriched");
        hub.broadcast(&event);

        let payload = rx.recv().await.unwrap();
        assert_eq!(payload, serde_json::to_string(&event).unwrap());
        assert!(payload.contains("\"type\":\"ticket_update\""));
        assert!(payload.contains("\"status\":\"enriched\""));
        // manager is omitted when absent
        assert!(!payload.contains("manager"));
    }

    #[tokio::test]
    async fn test_manager_field_serialized_when_set() {
        let hub = EventHub::new();
        let (_id, mut rx) = hub.subscribe();

        let event = TicketEvent::ticket_update(Uuid::nil(), "routed").with_manager("Иванов Иван");
        hub.broadcast(&event);

        let payload = rx.recv().await.unwrap();
        assert!(payload.contains("\"manager\":\"Иванов Иван\""));
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_without_blocking_others() {
        let hub = EventHub::new();
        let (_slow_id, mut slow_rx) = hub.subscribe();
        let (_fast_id, mut fast_rx) = hub.subscribe();

        // Broadcast well past the queue bound; the producer never blocks.
        for i in 0..100 {
            let event = TicketEvent::ticket_update(Uuid::nil(), &format!("status-{}", i));
            hub.broadcast(&event);
            // Fast subscriber keeps draining.
            let got = fast_rx.recv().await.unwrap();
            assert!(got.contains(&format!("status-{}", i)));
        }

        // Slow subscriber saw only the first queue-bound worth of events.
        let mut received = 0;
        while slow_rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, SUBSCRIBER_QUEUE_SIZE);
    }

    #[tokio::test]
    async fn test_closed_subscriber_pruned_on_broadcast() {
        let hub = EventHub::new();
        let (_id, rx) = hub.subscribe();
        drop(rx);
        assert_eq!(hub.subscriber_count(), 1);

        hub.broadcast(&TicketEvent::ticket_update(Uuid::nil(), "new"));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let hub = EventHub::new();
        let (id, _rx) = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        hub.unsubscribe(id);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
