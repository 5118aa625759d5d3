//! Frame fan-out to channel subscribers.
//!
//! Every decoded inbound frame is delivered to all live subscriptions in
//! registration order.  A [`Subscription`] is a disposable handle: dropping
//! it deregisters the listener, so a closed session can never receive a
//! frame for a conversation it no longer shows.

use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use causerie_shared::protocol::ServerFrame;

/// Identifies one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct Entry {
    id: ListenerId,
    tx: mpsc::UnboundedSender<ServerFrame>,
}

/// Fan-out hub owned by a channel.
///
/// Cloning the hub shares the listener table; the channel event loop holds
/// one clone and broadcasts into it.
#[derive(Debug, Clone, Default)]
pub struct SubscriberHub {
    entries: Arc<Mutex<Vec<Entry>>>,
}

impl SubscriberHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new listener and hand back its receiving end.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ListenerId::new();

        match self.entries.lock() {
            Ok(mut entries) => {
                entries.push(Entry { id, tx });
                debug!(listener = %id, total = entries.len(), "Subscriber registered");
            }
            Err(e) => warn!(error = %e, "Subscriber table lock poisoned"),
        }

        Subscription {
            id,
            rx,
            entries: Arc::downgrade(&self.entries),
        }
    }

    /// Deliver one frame to every live listener, in registration order.
    ///
    /// Listeners whose receiving end is gone are pruned on the way.  Returns
    /// the number of listeners that got the frame.
    pub fn broadcast(&self, frame: &ServerFrame) -> usize {
        match self.entries.lock() {
            Ok(mut entries) => {
                entries.retain(|entry| entry.tx.send(frame.clone()).is_ok());
                entries.len()
            }
            Err(e) => {
                warn!(error = %e, "Subscriber table lock poisoned, frame dropped");
                0
            }
        }
    }

    /// Drop every listener entry.
    ///
    /// The channel event loop calls this on its way out so that pending
    /// `recv` calls see the end of the stream even while other clones of
    /// the hub are still alive.
    pub fn clear(&self) {
        match self.entries.lock() {
            Ok(mut entries) => entries.clear(),
            Err(e) => warn!(error = %e, "Subscriber table lock poisoned"),
        }
    }

    /// Number of live listeners.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Receiving end of one subscription.  Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: ListenerId,
    rx: mpsc::UnboundedReceiver<ServerFrame>,
    entries: Weak<Mutex<Vec<Entry>>>,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Wait for the next frame.  `None` once the channel task is gone and
    /// the backlog is drained.
    pub async fn recv(&mut self) -> Option<ServerFrame> {
        self.rx.recv().await
    }

    /// Non-blocking poll, for callers with their own scheduling.
    pub fn try_recv(&mut self) -> Option<ServerFrame> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(entries) = self.entries.upgrade() {
            if let Ok(mut entries) = entries.lock() {
                entries.retain(|entry| entry.id != self.id);
                debug!(listener = %self.id, "Subscriber deregistered");
            }
        }
    }
}
