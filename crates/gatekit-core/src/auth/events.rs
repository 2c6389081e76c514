//! Process-wide session-state notifications.
//!
//! Session expiry is usually discovered deep inside the request client,
//! far from whatever should react to it (a login redirect, a cache purge).
//! The broadcaster decouples detection from reaction: the client publishes,
//! listeners re-read the credential store and act.
//!
//! Events are delivery-only. They carry no token material and are never
//! stored; a listener registered after a publish never sees that event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// What changed about the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventKind {
    /// A new token set was persisted (login or refresh).
    TokenSaved,
    /// The server rejected the token as expired/invalid; the store has
    /// already been cleared when this fires.
    TokenExpired,
    /// The user signed out.
    LoggedOut,
}

/// A session-state transition. Treat as a trigger to re-read the
/// credential store, not as a payload of truth.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub timestamp: DateTime<Utc>,
}

type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Synchronous in-process publish/subscribe for session events.
///
/// Share via `Arc`. Delivery is in registration order; a panicking
/// listener is caught and logged without blocking the rest.
#[derive(Default)]
pub struct SessionBroadcaster {
    listeners: Arc<Mutex<Vec<(u64, Listener)>>>,
    next_id: AtomicU64,
}

impl SessionBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. The returned handle is the only way to remove
    /// it; dropping the handle without calling `unsubscribe` leaves the
    /// listener registered for the life of the broadcaster.
    ///
    /// Listeners run on the publisher's thread. Expensive reactions should
    /// hand off to their own task rather than block delivery.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .push((id, Arc::new(listener)));
        Subscription {
            id,
            listeners: Arc::clone(&self.listeners),
        }
    }

    /// Deliver an event to every currently-registered listener, in
    /// registration order.
    pub fn publish(&self, kind: SessionEventKind) {
        let event = SessionEvent {
            kind,
            timestamp: Utc::now(),
        };

        // Snapshot outside the lock so a listener may subscribe or
        // unsubscribe re-entrantly without deadlocking.
        let snapshot: Vec<Listener> = self
            .listeners
            .lock()
            .expect("listener lock poisoned")
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        debug!(kind = ?event.kind, listeners = snapshot.len(), "publishing session event");

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                warn!(kind = ?event.kind, "session listener panicked");
            }
        }
    }
}

/// Capability to remove a registered listener.
pub struct Subscription {
    id: u64,
    listeners: Arc<Mutex<Vec<(u64, Listener)>>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .retain(|(id, _)| *id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn delivers_in_registration_order() {
        let broadcaster = SessionBroadcaster::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        let _s1 = broadcaster.subscribe(move |_| o1.lock().unwrap().push(1));
        let o2 = order.clone();
        let _s2 = broadcaster.subscribe(move |_| o2.lock().unwrap().push(2));

        broadcaster.publish(SessionEventKind::TokenSaved);
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let broadcaster = SessionBroadcaster::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let sub = broadcaster.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        broadcaster.publish(SessionEventKind::LoggedOut);
        sub.unsubscribe();
        broadcaster.publish(SessionEventKind::LoggedOut);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_subscriber_misses_earlier_events() {
        let broadcaster = SessionBroadcaster::new();
        broadcaster.publish(SessionEventKind::TokenExpired);

        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let _sub = broadcaster.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let broadcaster = SessionBroadcaster::new();
        let count = Arc::new(AtomicUsize::new(0));

        let _bad = broadcaster.subscribe(|_| panic!("listener bug"));
        let c = count.clone();
        let _good = broadcaster.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        broadcaster.publish(SessionEventKind::TokenExpired);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn event_carries_kind_and_timestamp() {
        let broadcaster = SessionBroadcaster::new();
        let seen = Arc::new(Mutex::new(None));

        let s = seen.clone();
        let _sub = broadcaster.subscribe(move |e| {
            *s.lock().unwrap() = Some((e.kind, e.timestamp));
        });

        let before = Utc::now();
        broadcaster.publish(SessionEventKind::TokenSaved);

        let (kind, ts) = seen.lock().unwrap().expect("event delivered");
        assert_eq!(kind, SessionEventKind::TokenSaved);
        assert!(ts >= before);
    }
}
