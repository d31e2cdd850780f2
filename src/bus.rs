use crate::catalog::Entity;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// One scroll-position sample supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollReading {
    pub scroll_top: f64,
    pub viewport_height: f64,
    pub document_height: f64,
}

impl ScrollReading {
    /// Position of the viewport bottom within the document.
    pub fn extent(&self) -> f64 {
        self.scroll_top + self.viewport_height
    }
}

/// A typed message observed by whichever listeners are attached at dispatch
/// time. Ephemeral: never queued, never retried.
#[derive(Debug, Clone)]
pub enum Notification {
    EntityDiscovered { entity: Entity },
    Teach { entity: Entity },
    ChecklistRequested,
    Scroll { reading: ScrollReading },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    EntityDiscovered,
    Teach,
    ChecklistRequested,
    Scroll,
}

impl Notification {
    pub fn topic(&self) -> Topic {
        match self {
            Notification::EntityDiscovered { .. } => Topic::EntityDiscovered,
            Notification::Teach { .. } => Topic::Teach,
            Notification::ChecklistRequested => Topic::ChecklistRequested,
            Notification::Scroll { .. } => Topic::Scroll,
        }
    }
}

/// Token returned by [`Bus::subscribe`]. Listeners persist for the page
/// lifetime unless explicitly passed back to [`Bus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    topic: Topic,
    id: u64,
}

type Handler = Arc<dyn Fn(&Notification) + Send + Sync>;

struct Registered {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct BusState {
    listeners: HashMap<Topic, Vec<Registered>>,
    next_id: u64,
}

/// Shared notification bus: synchronous, in-registration-order delivery.
///
/// Dispatch snapshots the listener list before calling out, so delivery is
/// re-entrant (a listener may publish, and the nested dispatch completes
/// before the outer one resumes) and a listener subscribed during dispatch
/// does not observe the in-flight notification.
pub struct Bus {
    inner: RwLock<BusState>,
}

impl Bus {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BusState::default()),
        }
    }

    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let mut state = self.inner.write();
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.entry(topic).or_default().push(Registered {
            id,
            handler: Arc::new(handler),
        });
        Subscription { topic, id }
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        let mut state = self.inner.write();
        if let Some(registered) = state.listeners.get_mut(&subscription.topic) {
            registered.retain(|listener| listener.id != subscription.id);
        }
    }

    /// Delivers `notification` to every currently-registered listener of its
    /// topic, in registration order. No listeners is not an error.
    pub fn publish(&self, notification: Notification) {
        let topic = notification.topic();
        let snapshot: Vec<Handler> = {
            let state = self.inner.read();
            state
                .listeners
                .get(&topic)
                .map(|registered| registered.iter().map(|r| Arc::clone(&r.handler)).collect())
                .unwrap_or_default()
        };
        trace!(?topic, listeners = snapshot.len(), "dispatching notification");
        for handler in snapshot {
            handler(&notification);
        }
    }

    pub fn listener_count(&self, topic: Topic) -> usize {
        self.inner
            .read()
            .listeners
            .get(&topic)
            .map_or(0, Vec::len)
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}
