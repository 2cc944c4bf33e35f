//! Holds immutable state and applies the pure transition per flushed
//! batch (SPEC_FULL.md §4.3).

use std::sync::{Arc, Mutex, Weak};

use reflex_types::Transition;

use crate::config::EngineConfig;
use crate::panic::panic_message;
use crate::pubsub::{PubSub, PullStream};
use crate::queue::SignalQueue;
use crate::report::report_error;

/// `{ initial, transition }` plus the machinery to fold signals and
/// publish the resulting state on two raw streams.
///
/// `Automaton` never knows about effects or the combined event
/// enum — it only ever deals in `Sig` and `S`. `reflex-machine`
/// multiplexes its raw streams together with the effect controller's
/// events into the single subscriber feed described in SPEC_FULL.md
/// §4.6.
pub struct Automaton<S, Sig> {
    /// State paired with a monotonic generation counter, updated
    /// together so a subscriber can never observe one without the
    /// other (`tracing`'s `state_generation` field, §7A, reads this).
    state: Mutex<(Arc<S>, u64)>,
    transition: Box<dyn Transition<S, Sig> + Send + Sync>,
    queue: Arc<SignalQueue<Sig>>,
    update_stream: Arc<PubSub<(Sig, Arc<S>)>>,
    state_stream: Arc<PubSub<Arc<S>>>,
    generation_stream: Arc<PubSub<(Arc<S>, u64)>>,
    config: EngineConfig,
}

impl<S, Sig> Automaton<S, Sig>
where
    S: Send + Sync + 'static,
    Sig: Clone + Send + Sync + 'static,
{
    pub fn new<T>(initial: S, transition: T, config: EngineConfig) -> Arc<Self>
    where
        T: Transition<S, Sig> + Send + Sync + 'static,
    {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let flush_yields = config.get_flush_yields();
            let weak_for_sink = weak.clone();
            let queue = SignalQueue::new(
                flush_yields,
                Arc::new(move |batch: Vec<Sig>| {
                    if let Some(this) = weak_for_sink.upgrade() {
                        this.apply_batch(batch);
                    }
                }),
            );

            Self {
                state: Mutex::new((Arc::new(initial), 0)),
                transition: Box::new(transition),
                queue,
                update_stream: PubSub::new(),
                state_stream: PubSub::new(),
                generation_stream: PubSub::new(),
                config,
            }
        })
    }

    /// Enqueues `signal`; returns immediately. Never blocks, never
    /// suspends — folding happens on the next scheduling boundary.
    pub fn dispatch(&self, signal: Sig) {
        self.queue.schedule(signal);
    }

    /// Synchronous snapshot of the current state.
    pub fn state(&self) -> Arc<S> {
        self.state.lock().unwrap().0.clone()
    }

    /// Monotonic counter incremented once per successfully folded
    /// signal; `0` before any signal has been applied. Paired with
    /// `state()` in the same critical section so the two never drift
    /// apart (see `generation_pubsub`).
    pub fn generation(&self) -> u64 {
        self.state.lock().unwrap().1
    }

    /// Lazy pull stream seeded with the current state, then every
    /// subsequently committed state.
    pub fn state_stream(&self) -> PullStream<Arc<S>> {
        PullStream::new(&self.state_stream, Some(self.state()))
    }

    /// Lazy pull stream of `(signal, new_state)` pairs, not seeded.
    pub fn update_stream(&self) -> PullStream<(Sig, Arc<S>)> {
        PullStream::new(&self.update_stream, None)
    }

    /// Raw state pubsub. Exposed (alongside [`Automaton::update_pubsub`])
    /// for advanced callers composing their own facade, the same way
    /// `EffectController::start` drives reconciliation directly off of
    /// it without going through the async pull-stream layer.
    pub fn state_pubsub(&self) -> &Arc<PubSub<Arc<S>>> {
        &self.state_stream
    }

    /// Raw `(signal, state)` pubsub backing [`Automaton::update_stream`].
    pub fn update_pubsub(&self) -> &Arc<PubSub<(Sig, Arc<S>)>> {
        &self.update_stream
    }

    /// Raw `(state, generation)` pubsub consumed by `EffectController`
    /// so a reconciliation pass can tag its `tracing` span with the
    /// `state_generation` that produced it (SPEC_FULL.md §7A).
    pub fn generation_pubsub(&self) -> &Arc<PubSub<(Arc<S>, u64)>> {
        &self.generation_stream
    }

    fn apply_batch(&self, batch: Vec<Sig>) {
        for signal in batch {
            let (previous, previous_generation) = self.state.lock().unwrap().clone();

            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                self.transition.apply(&signal, &previous)
            }));

            let new_state = match outcome {
                Ok(state) => Arc::new(state),
                Err(panic) => {
                    report_error(
                        &self.config,
                        reflex_types::EngineError::TransitionFailed {
                            message: panic_message(&panic),
                        },
                    );
                    continue;
                }
            };
            let new_generation = previous_generation + 1;

            {
                let mut state = self.state.lock().unwrap();
                *state = (new_state.clone(), new_generation);
            }

            let failures = self
                .update_stream
                .publish(&(signal.clone(), new_state.clone()));
            if failures > 0 {
                report_error(&self.config, reflex_types::EngineError::Aggregate(failures));
            }

            let failures = self.state_stream.publish(&new_state);
            if failures > 0 {
                report_error(&self.config, reflex_types::EngineError::Aggregate(failures));
            }

            let failures = self
                .generation_stream
                .publish(&(new_state, new_generation));
            if failures > 0 {
                report_error(&self.config, reflex_types::EngineError::Aggregate(failures));
            }
        }
    }
}
