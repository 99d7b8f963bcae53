//! Fan-out of domain events to the real-time/notification collaborator.
//!
//! The engine and the sweeper only know the [`Notifying`] trait; transport is
//! injected at startup. Delivery problems are logged and never fail the
//! operation that produced the event.

use {model::events::AuctionEvent, tokio::sync::broadcast};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Notifying: Send + Sync {
    async fn notify(&self, event: AuctionEvent);
}

/// Publishes events on a broadcast channel. The push layer (websocket
/// gateway, notification dispatcher) subscribes and forwards; with no
/// subscriber connected events are dropped, which is fine for a cache of
/// live updates.
pub struct Broadcaster {
    sender: broadcast::Sender<AuctionEvent>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuctionEvent> {
        self.sender.subscribe()
    }
}

#[async_trait::async_trait]
impl Notifying for Broadcaster {
    async fn notify(&self, event: AuctionEvent) {
        tracing::trace!(?event, "publishing event");
        // Err only means there is currently no subscriber.
        let _ = self.sender.send(event);
    }
}
