//! Server push channel.
//!
//! Messages arriving from the server's event feed are routed by their `type`
//! to at most one handler. Subscribing again for a type replaces the previous
//! handler; the replaced [`Subscription`] becomes inert, so dropping it later
//! does not remove the newer handler.

use crate::error::{Result, TriageError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Message type carrying execution progress.
pub const ACTION_MESSAGE_TYPE: &str = "action";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl PushMessage {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub request_id: uuid::Uuid,
    pub processed: u64,
    pub total: u64,
}

impl ProgressEvent {
    pub fn from_message(message: &PushMessage) -> Result<Self> {
        if message.kind != ACTION_MESSAGE_TYPE {
            return Err(TriageError::Channel(format!(
                "expected '{ACTION_MESSAGE_TYPE}' message, got '{}'",
                message.kind
            )));
        }
        serde_json::from_value(serde_json::Value::Object(message.payload.clone()))
            .map_err(|e| TriageError::Channel(format!("bad progress payload: {e}")))
    }

    pub fn into_message(self) -> PushMessage {
        let payload = match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        PushMessage {
            kind: ACTION_MESSAGE_TYPE.to_string(),
            payload,
        }
    }
}

type Handler = Arc<dyn Fn(&PushMessage) + Send + Sync>;

#[derive(Default)]
pub struct PushChannel {
    handlers: Mutex<HashMap<String, (u64, Handler)>>,
    next_token: AtomicU64,
    connected: AtomicBool,
}

impl PushChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `handler` for messages of type `kind`, replacing any current one.
    pub fn subscribe<F>(self: &Arc<Self>, kind: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&PushMessage) + Send + Sync + 'static,
    {
        let kind = kind.into();
        let token = self.next_token.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .handlers()
            .insert(kind.clone(), (token, Arc::new(handler)))
            .is_some()
        {
            tracing::debug!(kind = %kind, "push handler replaced");
        }
        Subscription {
            channel: Arc::downgrade(self),
            kind,
            token,
        }
    }

    /// Deliver `message` to its handler. Returns false if nobody listens.
    pub fn dispatch(&self, message: &PushMessage) -> bool {
        // Clone out so a handler may subscribe or unsubscribe without deadlocking.
        let handler = self
            .handlers()
            .get(&message.kind)
            .map(|(_, h)| Arc::clone(h));
        match handler {
            Some(h) => {
                h(message);
                true
            }
            None => {
                tracing::trace!(kind = %message.kind, "no push handler");
                false
            }
        }
    }

    pub fn has_listener(&self, kind: &str) -> bool {
        self.handlers().contains_key(kind)
    }

    pub fn set_connected(&self, connected: bool) {
        let was = self.connected.swap(connected, Ordering::SeqCst);
        if was != connected {
            tracing::info!(connected, "push channel state changed");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn unsubscribe(&self, kind: &str, token: u64) {
        let mut handlers = self.handlers();
        if handlers.get(kind).is_some_and(|(t, _)| *t == token) {
            handlers.remove(kind);
        }
    }

    fn handlers(&self) -> MutexGuard<'_, HashMap<String, (u64, Handler)>> {
        self.handlers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for PushChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<String> = self.handlers().keys().cloned().collect();
        f.debug_struct("PushChannel")
            .field("handlers", &kinds)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Keeps a handler registered until dropped.
#[must_use = "dropping the subscription unregisters the handler"]
#[derive(Debug)]
pub struct Subscription {
    channel: Weak<PushChannel>,
    kind: String,
    token: u64,
}

impl Subscription {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// True while this subscription's handler is the registered one.
    pub fn is_current(&self) -> bool {
        let Some(channel) = self.channel.upgrade() else {
            return false;
        };
        let current = channel
            .handlers()
            .get(&self.kind)
            .is_some_and(|(t, _)| *t == self.token);
        current
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.upgrade() {
            channel.unsubscribe(&self.kind, self.token);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter(channel: &Arc<PushChannel>, kind: &str) -> (Subscription, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let sub = channel.subscribe(kind, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (sub, hits)
    }

    #[test]
    fn dispatch_routes_by_type() {
        let channel = PushChannel::new();
        let (_sub, hits) = counter(&channel, "action");
        assert!(channel.dispatch(&PushMessage::new("action")));
        assert!(!channel.dispatch(&PushMessage::new("other")));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn newer_subscription_replaces_older() {
        let channel = PushChannel::new();
        let (old, old_hits) = counter(&channel, "action");
        let (new, new_hits) = counter(&channel, "action");
        assert!(!old.is_current());
        assert!(new.is_current());

        channel.dispatch(&PushMessage::new("action"));
        drop(old);
        channel.dispatch(&PushMessage::new("action"));

        assert_eq!(old_hits.load(Ordering::SeqCst), 0);
        assert_eq!(new_hits.load(Ordering::SeqCst), 2);
        assert!(channel.has_listener("action"));

        drop(new);
        assert!(!channel.has_listener("action"));
    }

    #[test]
    fn progress_event_wire_format() {
        let id = uuid::Uuid::new_v4();
        let raw = format!(r#"{{"type":"action","request_id":"{id}","processed":5,"total":10}}"#);
        let message: PushMessage = serde_json::from_str(&raw).unwrap();
        let event = ProgressEvent::from_message(&message).unwrap();
        assert_eq!(
            event,
            ProgressEvent {
                request_id: id,
                processed: 5,
                total: 10
            }
        );
        assert_eq!(event.into_message(), message);
    }

    #[test]
    fn progress_event_rejects_other_types_and_bad_payloads() {
        assert!(ProgressEvent::from_message(&PushMessage::new("status")).is_err());
        assert!(ProgressEvent::from_message(&PushMessage::new("action")).is_err());
    }

    #[test]
    fn connection_state_is_tracked() {
        let channel = PushChannel::new();
        assert!(!channel.is_connected());
        channel.set_connected(true);
        assert!(channel.is_connected());
    }
}
