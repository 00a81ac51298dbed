//! Per-channel publish/subscribe dispatch.
//!
//! Subscribers are keyed by [`EventKind`] and receive the decoded
//! [`ChannelEvent`]. A subscriber that returns an error is logged and skipped;
//! the remaining subscribers still run.

use std::collections::HashMap;
use std::rc::Rc;

use familyplanner_shared::{MessageKind, ServerMessage};

/// What a channel publishes: lifecycle changes and decoded server messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Message(ServerMessage),
}

impl ChannelEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChannelEvent::Connected => EventKind::Connected,
            ChannelEvent::Disconnected => EventKind::Disconnected,
            ChannelEvent::Message(message) => EventKind::Message(message.kind()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    Message(MessageKind),
}

impl From<MessageKind> for EventKind {
    fn from(kind: MessageKind) -> Self {
        EventKind::Message(kind)
    }
}

pub type Callback = dyn Fn(&ChannelEvent) -> anyhow::Result<()>;

/// Handle returned by [`EventBus::on`], used to remove a single subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

#[derive(Default)]
pub struct EventBus {
    subscribers: HashMap<EventKind, Vec<(SubscriberId, Rc<Callback>)>>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a subscriber. Registering the same logic twice runs it twice.
    pub fn on<F>(&mut self, kind: impl Into<EventKind>, callback: F) -> SubscriberId
    where
        F: Fn(&ChannelEvent) -> anyhow::Result<()> + 'static,
    {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.subscribers
            .entry(kind.into())
            .or_default()
            .push((id, Rc::new(callback)));
        id
    }

    /// Remove one subscriber, or every subscriber of `kind` when `id` is `None`.
    /// Returns how many were removed.
    pub fn off(&mut self, kind: impl Into<EventKind>, id: Option<SubscriberId>) -> usize {
        let kind = kind.into();
        match id {
            None => self
                .subscribers
                .remove(&kind)
                .map(|list| list.len())
                .unwrap_or(0),
            Some(id) => {
                let Some(list) = self.subscribers.get_mut(&kind) else {
                    return 0;
                };
                let before = list.len();
                list.retain(|(existing, _)| *existing != id);
                let removed = before - list.len();
                if list.is_empty() {
                    self.subscribers.remove(&kind);
                }
                removed
            }
        }
    }

    pub fn clear(&mut self) {
        self.subscribers.clear();
    }

    pub fn subscriber_count(&self, kind: impl Into<EventKind>) -> usize {
        self.subscribers
            .get(&kind.into())
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Copy of the current subscriber list for `kind`, in registration order.
    pub fn snapshot(&self, kind: EventKind) -> Vec<Rc<Callback>> {
        self.subscribers
            .get(&kind)
            .map(|list| list.iter().map(|(_, cb)| Rc::clone(cb)).collect())
            .unwrap_or_default()
    }

    pub fn trigger(&self, event: &ChannelEvent) {
        dispatch(&self.snapshot(event.kind()), event);
    }
}

/// Run `callbacks` in order; a failing callback never stops the others.
pub(crate) fn dispatch(callbacks: &[Rc<Callback>], event: &ChannelEvent) {
    for callback in callbacks {
        if let Err(err) = callback(event) {
            tracing::error!(event = ?event.kind(), "subscriber failed: {err:#}");
        }
    }
}
