//! Publish/subscribe fan-out for pushed lines and lifecycle events.
//!
//! Handlers are plain synchronous closures, called in registration
//! order from the connection's read loop. A failing or panicking
//! handler is logged and skipped; the remaining handlers still run.
//!
//! ```rust,ignore
//! use excs_api::{Signal, StationEvent};
//!
//! // One-shot: the handler receives its own token and revokes itself.
//! client.subscribe_with_token(Signal::DataPushed, |event, token| {
//!     if let StationEvent::DataPushed(line) = event {
//!         if line == "p1" || line == "p0" {
//!             token.unsubscribe();
//!             tracing::info!(line, "initial power state");
//!         }
//!     }
//!     Ok(())
//! });
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use strum::{Display, EnumString};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

// ── Signals and events ───────────────────────────────────────────────

/// Signal names a handler can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Signal {
    Connected,
    Disconnected,
    DataPushed,
}

/// An event delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationEvent {
    /// The stream was (re)opened.
    Connected,
    /// The stream was closed, by request or because it failed.
    Disconnected { reason: String },
    /// A line that no pending request claimed, unmodified.
    DataPushed(String),
}

impl StationEvent {
    pub fn signal(&self) -> Signal {
        match self {
            Self::Connected => Signal::Connected,
            Self::Disconnected { .. } => Signal::Disconnected,
            Self::DataPushed(_) => Signal::DataPushed,
        }
    }
}

/// Error a handler may return; it is logged, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = Result<(), HandlerError>;

type Handler = Arc<dyn Fn(&StationEvent, &Subscription) -> HandlerResult + Send + Sync>;

// ── Subscription token ───────────────────────────────────────────────

/// Revocable registration token returned by [`Dispatcher::subscribe`].
///
/// Dropping the token does not unsubscribe; call
/// [`unsubscribe`](Self::unsubscribe). Clones refer to the same
/// registration.
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    signal: Signal,
    active: Arc<AtomicBool>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Remove this handler. Idempotent.
    ///
    /// Takes effect immediately, including for a dispatch that is
    /// already in progress on another handler.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.entries.retain(|entry| entry.id != self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn signal(&self) -> Signal {
        self.signal
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("signal", &self.signal)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────

struct Entry {
    id: u64,
    token: Subscription,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<Entry>,
}

/// Handler registry plus a broadcast mirror for async consumers.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Mutex<Registry>>,
    events: broadcast::Sender<StationEvent>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            events,
        }
    }

    /// Register `handler` for `signal`.
    pub fn subscribe<F>(&self, signal: Signal, handler: F) -> Subscription
    where
        F: Fn(&StationEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe_with_token(signal, move |event, _| handler(event))
    }

    /// Register a handler that also receives its own [`Subscription`],
    /// so it can revoke itself from inside its body.
    pub fn subscribe_with_token<F>(&self, signal: Signal, handler: F) -> Subscription
    where
        F: Fn(&StationEvent, &Subscription) -> HandlerResult + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;

        let token = Subscription {
            id,
            signal,
            active: Arc::new(AtomicBool::new(true)),
            registry: Arc::downgrade(&self.registry),
        };
        registry.entries.push(Entry {
            id,
            token: token.clone(),
            handler: Arc::new(handler),
        });
        token
    }

    /// Get a broadcast receiver mirroring every dispatched event.
    ///
    /// Slow receivers get [`broadcast::error::RecvError::Lagged`].
    pub fn events(&self) -> broadcast::Receiver<StationEvent> {
        self.events.subscribe()
    }

    /// Number of live handlers for `signal`.
    pub fn handler_count(&self, signal: Signal) -> usize {
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry
            .entries
            .iter()
            .filter(|entry| entry.token.signal == signal)
            .count()
    }

    /// Deliver `event` to every handler of its signal, in registration
    /// order. Returns how many handlers completed successfully.
    pub fn dispatch(&self, event: &StationEvent) -> usize {
        let signal = event.signal();

        // Snapshot so handlers can (un)subscribe without deadlocking.
        let targets: Vec<(Subscription, Handler)> = {
            let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry
                .entries
                .iter()
                .filter(|entry| entry.token.signal == signal)
                .map(|entry| (entry.token.clone(), Arc::clone(&entry.handler)))
                .collect()
        };

        let mut delivered = 0;
        for (token, handler) in targets {
            if !token.is_active() {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| handler(event, &token))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::error!(%signal, error = %e, "Event handler failed");
                }
                Err(_) => {
                    tracing::error!(%signal, "Event handler panicked");
                }
            }
        }

        // Ignore send errors -- just means no async receivers right now
        let _ = self.events.send(event.clone());
        delivered
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn pushed(line: &str) -> StationEvent {
        StationEvent::DataPushed(line.to_owned())
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let dispatcher = Dispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let log = Arc::clone(&log);
            dispatcher.subscribe(Signal::DataPushed, move |_| {
                log.lock().unwrap().push(n);
                Ok(())
            });
        }

        assert_eq!(dispatcher.dispatch(&pushed("p1")), 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn only_matching_signal_is_delivered() {
        let dispatcher = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        dispatcher.subscribe(Signal::Connected, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        dispatcher.dispatch(&pushed("p1"));
        dispatcher.dispatch(&StationEvent::Disconnected { reason: "test".into() });
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        dispatcher.dispatch(&StationEvent::Connected);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_handler_does_not_block_others() {
        let dispatcher = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));

        dispatcher.subscribe(Signal::DataPushed, |_| Err("boom".into()));
        dispatcher.subscribe(Signal::DataPushed, |_| panic!("handler bug"));
        let h = Arc::clone(&hits);
        dispatcher.subscribe(Signal::DataPushed, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(dispatcher.dispatch(&pushed("H 1 0")), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribed_handler_receives_nothing_more() {
        let dispatcher = Dispatcher::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&first);
        let token = dispatcher.subscribe(Signal::DataPushed, move |_| {
            f.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let s = Arc::clone(&second);
        dispatcher.subscribe(Signal::DataPushed, move |_| {
            s.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        dispatcher.dispatch(&pushed("p1"));
        token.unsubscribe();
        token.unsubscribe();
        dispatcher.dispatch(&pushed("p0"));

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.handler_count(Signal::DataPushed), 1);
    }

    #[test]
    fn unsubscribe_during_dispatch_skips_later_handler() {
        let dispatcher = Dispatcher::new();
        let late_hits = Arc::new(AtomicUsize::new(0));
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let v = Arc::clone(&victim);
        dispatcher.subscribe(Signal::DataPushed, move |_| {
            if let Some(token) = v.lock().unwrap().as_ref() {
                token.unsubscribe();
            }
            Ok(())
        });
        let h = Arc::clone(&late_hits);
        let token = dispatcher.subscribe(Signal::DataPushed, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        *victim.lock().unwrap() = Some(token);

        dispatcher.dispatch(&pushed("p1"));
        assert_eq!(late_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn one_shot_handler_revokes_itself() {
        let dispatcher = Dispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = Arc::clone(&seen);
        let token = dispatcher.subscribe_with_token(Signal::DataPushed, move |event, token| {
            if let StationEvent::DataPushed(line) = event {
                if line == "p1" || line == "p0" {
                    token.unsubscribe();
                    s.lock().unwrap().push(line.clone());
                }
            }
            Ok(())
        });

        dispatcher.dispatch(&pushed("H 3 1"));
        dispatcher.dispatch(&pushed("p1"));
        dispatcher.dispatch(&pushed("p0"));

        assert_eq!(*seen.lock().unwrap(), vec!["p1".to_owned()]);
        assert!(!token.is_active());
    }

    #[test]
    fn broadcast_mirror_receives_events() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.events();
        dispatcher.dispatch(&StationEvent::Connected);
        assert_eq!(rx.try_recv().unwrap(), StationEvent::Connected);
    }
}
