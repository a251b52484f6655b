//! Audit events for issued and revoked credentials.
//!
//! The engine publishes `AuditEvent`s on an `EventBus`; collaborators such
//! as an audit log subscribe to it. Raw secrets never appear in events.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

use serde::Serialize;
use uuid::Uuid;

/// Something an auditor wants to know happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    ApplicationRegistered {
        client_id: String,
        owner: String,
    },
    ApplicationUpdated {
        client_id: String,
        actor: String,
    },
    ApplicationDeleted {
        client_id: String,
        actor: String,
    },
    CodeIssued {
        client_id: String,
        owner: String,
        grant_id: Uuid,
    },
    TokensIssued {
        client_id: String,
        owner: Option<String>,
        grant_type: String,
        grant_id: Uuid,
        /// Whether a refresh token was part of the response
        refresh: bool,
    },
    TokenRevoked {
        client_id: String,
        token_type: String,
        grant_id: Uuid,
    },
    /// An exchanged, revoked or expired code was presented again
    CodeReuseDetected {
        client_id: String,
        grant_id: Uuid,
        revoked: usize,
    },
    /// A rotated-out refresh token was presented again
    RefreshReuseDetected {
        client_id: String,
        grant_id: Uuid,
        revoked: usize,
    },
}

/// Subscription handle that unsubscribes automatically when dropped.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

type Callback = Arc<dyn Fn(&AuditEvent) + Send + Sync>;

/// Event bus for publishing audit events to subscribers.
///
/// Wrap in `Arc` to enable subscriptions.
#[derive(Default)]
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Callback)>>,
    next_id: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. Returns `Subscription` that unsubscribes on drop.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(&AuditEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        // try_write: Drop may run during unwinding while emit holds a read lock
        if let Ok(mut guard) = self.callbacks.try_write() {
            guard.retain(|(i, _)| *i != id);
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: AuditEvent) {
        // Clone the list so a callback may subscribe without deadlocking
        let callbacks: Vec<Callback> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_subscribe_and_drop() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let sub = bus.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        let event = AuditEvent::ApplicationDeleted {
            client_id: "c".into(),
            actor: "a".into(),
        };
        bus.emit(event.clone());
        drop(sub);
        bus.emit(event.clone());

        assert_eq!(*seen.lock().unwrap(), vec![event]);
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let json = serde_json::to_value(AuditEvent::ApplicationRegistered {
            client_id: "c".into(),
            owner: "o".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "application_registered");
    }
}
