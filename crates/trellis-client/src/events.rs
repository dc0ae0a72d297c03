use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;

use trellis_proto::{QueryPayload, RawResult};

use crate::error::LoadError;

/// Channels a load service exposes. `FormattingChanged` and
/// `CellFormatting` are the per-cell formatting override channels the
/// rendering layer listens to for no-reload presentation updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadEvent {
    Data,
    Error,
    Progress,
    FormattingChanged,
    CellFormatting,
}

#[derive(Debug, Clone)]
pub enum Notification {
    Data(Arc<RawResult>),
    Error(Arc<LoadError>),
    Progress(Value),
    FormattingChanged(Arc<QueryPayload>),
    CellFormatting(Value),
}

impl Notification {
    pub fn event(&self) -> LoadEvent {
        match self {
            Notification::Data(_) => LoadEvent::Data,
            Notification::Error(_) => LoadEvent::Error,
            Notification::Progress(_) => LoadEvent::Progress,
            Notification::FormattingChanged(_) => LoadEvent::FormattingChanged,
            Notification::CellFormatting(_) => LoadEvent::CellFormatting,
        }
    }
}

pub type NotificationHandler = Box<dyn Fn(&Notification) + Send + Sync>;

struct HandlerEntry {
    token: u64,
    handler: Arc<NotificationHandler>,
}

type HandlerMap = Mutex<HashMap<LoadEvent, Vec<HandlerEntry>>>;

/// Per-instance subscription registry: typed event name to ordered
/// handler list. There is no ambient global emitter; every service owns
/// its own registry.
#[derive(Default)]
pub struct EventRegistry {
    handlers: Arc<HandlerMap>,
    next_token: AtomicU64,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, event: LoadEvent, handler: NotificationHandler) -> EventSubscription {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .lock()
            .entry(event)
            .or_default()
            .push(HandlerEntry {
                token,
                handler: Arc::new(handler),
            });
        EventSubscription {
            handlers: Arc::downgrade(&self.handlers),
            event,
            token,
        }
    }

    /// Invokes handlers in subscription order, without the lock held.
    pub fn emit(&self, notification: &Notification) {
        let handlers: Vec<Arc<NotificationHandler>> = self
            .handlers
            .lock()
            .get(&notification.event())
            .map(|entries| entries.iter().map(|entry| entry.handler.clone()).collect())
            .unwrap_or_default();
        for handler in handlers {
            handler(notification);
        }
    }
}

/// Handle returned from `subscribe`; consuming it removes the handler.
pub struct EventSubscription {
    handlers: Weak<HandlerMap>,
    event: LoadEvent,
    token: u64,
}

impl EventSubscription {
    pub fn unsubscribe(self) {
        if let Some(handlers) = self.handlers.upgrade() {
            if let Some(entries) = handlers.lock().get_mut(&self.event) {
                entries.retain(|entry| entry.token != self.token);
            }
        }
    }
}
