use crate::session::SessionId;
use cadavre_engine::turn::TurnAuthor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

// Bounded per-subscriber channels: a slow consumer drops events instead of
// exhausting memory. Consumers treat events as "something changed, re-fetch"
// so a dropped event costs one refresh, not correctness.
const DEFAULT_EVENT_BUFFER: usize = 256;

pub type EventSender = mpsc::Sender<GameEvent>;
pub type EventReceiver = mpsc::Receiver<GameEvent>;

/// Notification describing one committed session transaction. Ephemeral:
/// produced after commit, consumed by subscribers, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameEvent {
    pub session_id: SessionId,
    /// RFC 3339 timestamp taken at publication
    pub at: String,
    #[serde(flatten)]
    pub kind: GameEventKind,
}

impl GameEvent {
    pub fn now(session_id: SessionId, kind: GameEventKind) -> Self {
        Self {
            session_id,
            at: chrono::Utc::now().to_rfc3339(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEventKind {
    PlayerJoined {
        player_id: String,
        name: String,
        player_count: usize,
    },
    PlayerLeft {
        player_id: String,
        player_count: usize,
    },
    PlayerConnected {
        player_id: String,
        connection_count: usize,
    },
    PlayerDisconnected {
        player_id: String,
        connection_count: usize,
    },
    TurnSubmitted {
        turn_number: usize,
        author: TurnAuthor,
    },
    AiTurnStarted {
        turn_number: usize,
    },
    AiTurnFailed {
        reason: String,
    },
    SessionEnded {
        reason: String,
    },
}

/// Live subscription to one session's events. Unsubscribes itself on drop.
pub struct EventSubscription {
    bus: EventBus,
    session_id: SessionId,
    subscriber_id: usize,
    receiver: Option<EventReceiver>,
}

impl EventSubscription {
    pub fn try_recv(&mut self) -> Option<GameEvent> {
        self.receiver.as_mut()?.try_recv().ok()
    }

    pub async fn recv(&mut self) -> Option<GameEvent> {
        self.receiver.as_mut()?.recv().await
    }

    /// Detaches the receiver, e.g. to wrap it in a stream. The subscription
    /// itself must be kept alive for as long as events should flow; dropping
    /// it still unsubscribes.
    pub fn take_receiver(&mut self) -> Option<EventReceiver> {
        self.receiver.take()
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.session_id, self.subscriber_id);
    }
}

/// Per-session publish/subscribe fan-out.
#[derive(Debug, Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

#[derive(Debug)]
struct EventBusInner {
    subscribers: RwLock<HashMap<SessionId, Vec<(usize, EventSender)>>>,
    next_id: AtomicUsize,
    buffer: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_buffer(DEFAULT_EVENT_BUFFER)
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            inner: Arc::new(EventBusInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicUsize::new(0),
                buffer: buffer.max(1),
            }),
        }
    }

    pub fn subscribe(&self, session_id: SessionId) -> EventSubscription {
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        let subscriber_id = self.inner.next_id.fetch_add(1, Ordering::AcqRel);
        {
            let mut guard = self
                .inner
                .subscribers
                .write()
                .expect("subscriber lock poisoned");
            guard
                .entry(session_id.clone())
                .or_default()
                .push((subscriber_id, tx));
        }

        tracing::debug!(
            session_id = %session_id,
            subscriber_id,
            "client subscribed to game events"
        );

        EventSubscription {
            bus: self.clone(),
            session_id,
            subscriber_id,
            receiver: Some(rx),
        }
    }

    /// Delivers `event` to every subscriber of its session. At-least-once
    /// for live subscribers; dead or persistently full channels are pruned.
    pub fn broadcast(&self, event: GameEvent) {
        let session_id = event.session_id.clone();
        let subscribers = {
            let guard = self
                .inner
                .subscribers
                .read()
                .expect("subscriber lock poisoned");
            guard.get(&session_id).cloned()
        };

        let Some(list) = subscribers else {
            tracing::trace!(session_id = %session_id, "no subscribers for session");
            return;
        };

        let mut dead = Vec::new();
        for (id, sender) in list {
            match sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(id),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        session_id = %session_id,
                        subscriber_id = id,
                        "subscriber channel full, dropping event"
                    );
                }
            }
        }
        if !dead.is_empty() {
            self.remove_subscribers(&session_id, &dead);
        }
    }

    pub fn unsubscribe(&self, session_id: &SessionId, subscriber_id: usize) {
        self.remove_subscribers(session_id, &[subscriber_id]);
    }

    /// Discards every subscriber of a session; used when the session is
    /// reaped so gateways observe channel closure.
    pub fn drop_session(&self, session_id: &SessionId) {
        let mut guard = self
            .inner
            .subscribers
            .write()
            .expect("subscriber lock poisoned");
        guard.remove(session_id);
    }

    pub fn subscriber_count(&self) -> usize {
        let guard = self
            .inner
            .subscribers
            .read()
            .expect("subscriber lock poisoned");
        guard.values().map(Vec::len).sum()
    }

    fn remove_subscribers(&self, session_id: &SessionId, ids: &[usize]) {
        let mut guard = self
            .inner
            .subscribers
            .write()
            .expect("subscriber lock poisoned");
        if let Some(list) = guard.get_mut(session_id) {
            list.retain(|(id, _)| !ids.contains(id));
            if list.is_empty() {
                guard.remove(session_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ended(session: &str) -> GameEvent {
        GameEvent::now(
            session.to_string(),
            GameEventKind::SessionEnded {
                reason: "test".into(),
            },
        )
    }

    #[test]
    fn subscription_drop_unsubscribes() {
        let bus = EventBus::new();
        {
            let _sub = bus.subscribe("QQQQQ".into());
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn broadcast_reaches_all_subscribers() {
        let bus = EventBus::new();
        let mut first = bus.subscribe("QQQQQ".into());
        let mut second = bus.subscribe("QQQQQ".into());

        bus.broadcast(ended("QQQQQ"));

        for sub in [&mut first, &mut second] {
            let event = sub.try_recv().expect("event delivered");
            assert_eq!(
                event.kind,
                GameEventKind::SessionEnded {
                    reason: "test".into()
                }
            );
        }
    }

    #[test]
    fn broadcast_is_scoped_to_the_session() {
        let bus = EventBus::new();
        let mut other = bus.subscribe("OTHER".into());
        bus.broadcast(ended("QQQQQ"));
        assert!(other.try_recv().is_none());
    }

    #[test]
    fn closed_receiver_is_pruned() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("QQQQQ".into());
        drop(sub.take_receiver());
        bus.broadcast(ended("QQQQQ"));
        assert_eq!(bus.subscriber_count(), 0);
        drop(sub); // unsubscribing after pruning must not panic
    }

    #[test]
    fn event_serializes_with_flattened_kind() {
        let event = GameEvent::now(
            "QQQQQ".into(),
            GameEventKind::TurnSubmitted {
                turn_number: 2,
                author: cadavre_engine::turn::TurnAuthor::Ai,
            },
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "turn_submitted");
        assert_eq!(value["session_id"], "QQQQQ");
        assert_eq!(value["turn_number"], 2);
        assert!(value["at"].is_string());
    }
}
