//! The multiplexed event stream (§4.6).

use std::sync::Arc;

/// One event on the machine's subscriber feed.
///
/// `S` is the state type, `Sig` the signal type, `K` the effect key
/// type, `E` the effect descriptor type — the same four parameters used
/// throughout `reflex-core`.
///
/// Ordering within one reconciliation pass (enforced by the automaton
/// and effect controller, not by this type): `SignalReceived`,
/// `StateUpdated`, any `EffectCancelled`s, then any `EffectStarted`s.
#[derive(Clone, Debug)]
pub enum Event<S, Sig, K, E> {
    /// Emitted before the state produced by `signal` is published.
    SignalReceived(Sig),
    /// Emitted after the new state has been committed.
    StateUpdated(Arc<S>),
    /// Emitted once an effect's entry is in the running map, before its
    /// `start` future is polled for the first time.
    EffectStarted(K, E),
    /// Emitted once an effect's `cancel` has been invoked and its entry
    /// removed from the running map.
    EffectCancelled(K, E),
}

/// A handler registered via `subscribe`. Receives one event at a time;
/// no return value is consumed (panics are caught by the publisher and
/// folded into `EngineError::Aggregate`).
pub type Handler<S, Sig, K, E> = Box<dyn Fn(&Event<S, Sig, K, E>) + Send + Sync>;

/// Returned by `subscribe`; dropping it, or calling it, unsubscribes.
///
/// Implemented as a callback rather than a `Drop` guard so callers can
/// unsubscribe eagerly without holding on to the token's storage; the
/// pull-stream wrapper in `reflex-core` additionally unsubscribes from
/// its own `Drop` impl, which is what gives pull streams their
/// deterministic-GC property (see SPEC_FULL.md §4.1).
pub struct Unsubscribe(Box<dyn FnOnce() + Send>);

impl Unsubscribe {
    pub fn new(f: Box<dyn FnOnce() + Send>) -> Self {
        Self(f)
    }

    pub fn unsubscribe(self) {
        (self.0)()
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Unsubscribe(..)")
    }
}
