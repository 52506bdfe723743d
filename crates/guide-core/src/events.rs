//! Notifications for the surrounding UI.
//!
//! `GuideEvent` is published on an `EventBus`; subscribers hold a
//! `Subscription` and stop receiving events when it is dropped.

use crate::model::Scope;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// Save indicator state shown next to the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    #[default]
    Idle,
    Sending,
    Success,
    Error,
}

/// Events emitted by a guide session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GuideEvent {
    /// The guide open in the editor changed.
    SelectionChanged {
        #[serde(rename = "guideId")]
        guide_id: Option<String>,
        /// Whether the new selection starts in rename mode.
        renaming: bool,
    },
    /// The save indicator changed.
    SaveStatusChanged { status: SaveStatus },
    /// The rendered guide list changed (load, edit, reorder, delete, merge).
    ListChanged {
        scope: Scope,
        #[serde(rename = "conversationId")]
        conversation_id: Option<String>,
        count: usize,
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

type Callback = Arc<dyn Fn(GuideEvent) + Send + Sync>;

/// Event bus for publishing guide events to subscribers.
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
        callback: impl Fn(GuideEvent) + Send + Sync + 'static,
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
        // try_write: Drop may run while emit holds the read lock.
        if let Ok(mut guard) = self.callbacks.try_write() {
            guard.retain(|(i, _)| *i != id);
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: GuideEvent) {
        // Snapshot the list so a callback may subscribe without deadlocking.
        let callbacks: Vec<Callback> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_subscribe_and_emit() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let _sub = bus.subscribe(move |event| {
            seen_clone.lock().unwrap().push(event);
        });

        bus.emit(GuideEvent::SaveStatusChanged {
            status: SaveStatus::Sending,
        });

        assert_eq!(
            *seen.lock().unwrap(),
            vec![GuideEvent::SaveStatusChanged {
                status: SaveStatus::Sending
            }]
        );
    }

    #[test]
    fn test_subscription_unsubscribes_on_drop() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let sub = bus.subscribe(move |_| {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });
        bus.emit(GuideEvent::SelectionChanged {
            guide_id: None,
            renaming: false,
        });
        drop(sub);
        bus.emit(GuideEvent::SelectionChanged {
            guide_id: None,
            renaming: false,
        });

        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_event_serialization() {
        let event = GuideEvent::ListChanged {
            scope: Scope::Conversation,
            conversation_id: Some("r1".into()),
            count: 3,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"listChanged\""));
        assert!(json.contains("\"conversationId\":\"r1\""));
        assert!(json.contains("\"scope\":\"conversation\""));

        let status = serde_json::to_string(&GuideEvent::SaveStatusChanged {
            status: SaveStatus::Error,
        })
        .unwrap();
        assert!(status.contains("\"status\":\"error\""));
    }
}
