//! Composes an `Automaton` and an `EffectController` into the single
//! external surface ordinary callers use (SPEC_FULL.md §4.5).

use std::hash::Hash;
use std::sync::Arc;

use reflex_core::{Automaton, EffectController, EngineConfig, PubSub, PullStream};
use reflex_types::{EffectsAt, Event, RunEffect, Transition, Unsubscribe};

/// Owns an `Automaton` and an `EffectController` wired together, and
/// is the only surface ordinary callers need. `Automaton` and
/// `EffectController` remain `pub` in `reflex-core` for advanced
/// callers who want to decouple them.
pub struct Machine<S, Sig, K, E> {
    automaton: Arc<Automaton<S, Sig>>,
    controller: Arc<EffectController<S, K, E, Sig>>,
    events: Arc<PubSub<Event<S, Sig, K, E>>>,
    _relay_unsub: Unsubscribe,
}

impl<S, Sig, K, E> Machine<S, Sig, K, E>
where
    S: Send + Sync + 'static,
    Sig: Clone + Send + Sync + 'static,
    K: Eq + Hash + Clone + std::fmt::Debug + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new<T, EA, R>(
        initial: S,
        transition: T,
        effects_at: EA,
        run_effect: R,
        config: EngineConfig,
    ) -> Arc<Self>
    where
        T: Transition<S, Sig> + Send + Sync + 'static,
        EA: EffectsAt<S, K, E> + Send + Sync + 'static,
        R: RunEffect<S, K, E, Sig> + Send + Sync + 'static,
    {
        let automaton = Automaton::new(initial, transition, config.clone());
        let events = PubSub::new();

        // Relays `(signal, state)` onto the combined event feed as
        // `SignalReceived` then `StateUpdated`, preserving the order
        // invariant from §4.6 because this subscriber runs
        // synchronously inside `Automaton::apply_batch`.
        let events_for_relay = events.clone();
        let relay_unsub = automaton
            .update_pubsub()
            .subscribe(move |(signal, state): &(Sig, Arc<S>)| {
                events_for_relay.publish(&Event::SignalReceived(signal.clone()));
                events_for_relay.publish(&Event::StateUpdated(state.clone()));
            });

        let automaton_for_dispatch = automaton.clone();
        let controller = EffectController::new(
            effects_at,
            run_effect,
            move |signal: Sig| automaton_for_dispatch.dispatch(signal),
            events.clone(),
            config,
        );

        let initial_state = automaton.state();
        let initial_generation = automaton.generation();
        controller.start(
            automaton.generation_pubsub(),
            initial_state,
            initial_generation,
        );

        Arc::new(Self {
            automaton,
            controller,
            events,
            _relay_unsub: relay_unsub,
        })
    }

    pub fn dispatch(&self, signal: Sig) {
        self.automaton.dispatch(signal);
    }

    pub fn state(&self) -> Arc<S> {
        self.automaton.state()
    }

    pub fn state_stream(&self) -> PullStream<Arc<S>> {
        self.automaton.state_stream()
    }

    pub fn subscribe(
        &self,
        handler: impl Fn(&Event<S, Sig, K, E>) + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.events.subscribe(handler)
    }

    /// Lets running effects finish naturally instead of cancelling
    /// them; resolves once the controller has settled to `Stopped`.
    pub async fn stop(self: &Arc<Self>, force: bool) {
        self.controller.stop(force).await;
    }
}

impl<S, Sig, K, E> Drop for Machine<S, Sig, K, E> {
    fn drop(&mut self) {
        self.controller.stop_force();
    }
}
