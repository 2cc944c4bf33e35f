//! Reconciles the set of running effects against `effects_at(state)`
//! on every observed state (SPEC_FULL.md §4.4).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use reflex_types::{Cancel, EffectError, EffectsAt, EngineError, Event, RunEffect};

use crate::config::EngineConfig;
use crate::panic::panic_message;
use crate::pubsub::PubSub;
use crate::report::report_error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
    Stopped,
    Running,
    Braking,
}

struct RunningEffect<E> {
    descriptor: E,
    cancel: Cancel,
    /// Identity marker for guarded dispatch: a guarded dispatch holds a
    /// `Weak` handle to this and is a no-op once the strong copy here
    /// is dropped (cancelled or completed), without needing to
    /// re-check the running map at dispatch time.
    marker: Arc<()>,
}

/// `{ state_stream, effects_at, run_effect, dispatch }` from §4.4.
pub struct EffectController<S, K, E, Sig> {
    effects_at: Box<dyn EffectsAt<S, K, E> + Send + Sync>,
    run_effect: Arc<dyn RunEffect<S, K, E, Sig> + Send + Sync>,
    dispatch: Arc<dyn Fn(Sig) + Send + Sync>,
    running: Mutex<HashMap<K, RunningEffect<E>>>,
    events: Arc<PubSub<Event<S, Sig, K, E>>>,
    config: EngineConfig,
    status: Mutex<Status>,
    state_unsub: Mutex<Option<reflex_types::Unsubscribe>>,
    in_flight: AtomicUsize,
    braking_notify: tokio::sync::Notify,
    /// Serializes reconciliation passes across states so that one
    /// state's `EffectCancelled`/`EffectStarted` events are fully
    /// published before the next state's pass begins (§4.6 ordering).
    reconcile_lock: tokio::sync::Mutex<()>,
}

impl<S, K, E, Sig> EffectController<S, K, E, Sig>
where
    S: Send + Sync + 'static,
    K: Eq + Hash + Clone + std::fmt::Debug + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    Sig: Send + Sync + 'static,
{
    pub fn new(
        effects_at: impl EffectsAt<S, K, E> + Send + Sync + 'static,
        run_effect: impl RunEffect<S, K, E, Sig> + Send + Sync + 'static,
        dispatch: impl Fn(Sig) + Send + Sync + 'static,
        events: Arc<PubSub<Event<S, Sig, K, E>>>,
        config: EngineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            effects_at: Box::new(effects_at),
            run_effect: Arc::new(run_effect),
            dispatch: Arc::new(dispatch),
            running: Mutex::new(HashMap::new()),
            events,
            config,
            status: Mutex::new(Status::Stopped),
            state_unsub: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            braking_notify: tokio::sync::Notify::new(),
            reconcile_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Idempotent when already `Running`. Subscribes to
    /// `generation_pubsub` and reconciles the very first state after
    /// one scheduler yield (first-state timing, §4.4), then eagerly on
    /// every later state.
    pub fn start(
        self: &Arc<Self>,
        generation_pubsub: &Arc<PubSub<(Arc<S>, u64)>>,
        initial_state: Arc<S>,
        initial_generation: u64,
    ) {
        {
            let mut status = self.status.lock().unwrap();
            if *status == Status::Running {
                return;
            }
            *status = Status::Running;
        }

        let this = self.clone();
        let unsub = generation_pubsub.subscribe(move |(state, generation): &(Arc<S>, u64)| {
            let this = this.clone();
            let state = state.clone();
            let generation = *generation;
            tokio::spawn(async move {
                this.reconcile(state, generation).await;
            });
        });
        *self.state_unsub.lock().unwrap() = Some(unsub);

        let this = self.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            this.reconcile(initial_state, initial_generation).await;
        });
    }

    /// `force = true` cancels every running effect synchronously and
    /// transitions straight to `Stopped`. `force = false` stops taking
    /// new state but lets running effects finish, transitioning to
    /// `Stopped` once the last one settles (`Braking`).
    pub async fn stop(self: &Arc<Self>, force: bool) {
        if force {
            self.stop_force();
            return;
        }

        {
            let status = *self.status.lock().unwrap();
            if status == Status::Stopped {
                return;
            }
        }
        if let Some(unsub) = self.state_unsub.lock().unwrap().take() {
            unsub.unsubscribe();
        }

        *self.status.lock().unwrap() = Status::Braking;
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            self.braking_notify.notified().await;
        }
        *self.status.lock().unwrap() = Status::Stopped;
    }

    /// The synchronous half of `stop(force = true)`: cancels every
    /// running effect immediately and transitions to `Stopped`. Used
    /// directly from `Drop` impls, which cannot `.await`.
    pub fn stop_force(self: &Arc<Self>) {
        {
            let status = *self.status.lock().unwrap();
            if status == Status::Stopped {
                return;
            }
        }
        if let Some(unsub) = self.state_unsub.lock().unwrap().take() {
            unsub.unsubscribe();
        }

        let cancelled: Vec<(K, E)> = {
            let mut running = self.running.lock().unwrap();
            running
                .drain()
                .map(|(key, mut entry)| {
                    let result =
                        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (entry.cancel)()));
                    if result.is_err() {
                        report_error(
                            &self.config,
                            EngineError::CancelPanicked {
                                message: "cancel panicked during forced stop".to_string(),
                            },
                        );
                    }
                    (key, entry.descriptor)
                })
                .collect()
        };
        for (key, descriptor) in cancelled {
            let failures = self
                .events
                .publish(&Event::EffectCancelled(key, descriptor));
            if failures > 0 {
                report_error(&self.config, EngineError::Aggregate(failures));
            }
        }
        *self.status.lock().unwrap() = Status::Stopped;
    }

    pub fn is_running(&self) -> bool {
        *self.status.lock().unwrap() == Status::Running
    }

    pub fn is_stopped(&self) -> bool {
        *self.status.lock().unwrap() == Status::Stopped
    }

    #[tracing::instrument(
        name = "reconcile",
        level = "info",
        skip(self, state, generation),
        fields(state_generation = generation)
    )]
    async fn reconcile(self: &Arc<Self>, state: Arc<S>, generation: u64) {
        if *self.status.lock().unwrap() != Status::Running {
            return;
        }

        let _order_guard = self.reconcile_lock.lock().await;

        if *self.status.lock().unwrap() != Status::Running {
            return;
        }

        let desired = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.effects_at.compute(&state)
        })) {
            Ok(map) => map,
            Err(panic) => {
                report_error(
                    &self.config,
                    EngineError::EffectsAtFailed {
                        message: panic_message(&panic),
                    },
                );
                return;
            }
        };

        let to_cancel: Vec<(K, E)> = {
            let mut running = self.running.lock().unwrap();
            let keys: Vec<K> = running
                .keys()
                .filter(|k| !desired.contains_key(k))
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| {
                    running.remove(&key).map(|mut entry| {
                        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(
                            || (entry.cancel)(),
                        ));
                        if result.is_err() {
                            report_error(
                                &self.config,
                                EngineError::CancelPanicked {
                                    message: "cancel panicked during reconciliation".to_string(),
                                },
                            );
                        }
                        (key, entry.descriptor)
                    })
                })
                .collect()
        };
        for (key, descriptor) in to_cancel {
            tracing::debug!(key = ?key, "effect cancelled");
            let failures = self
                .events
                .publish(&Event::EffectCancelled(key, descriptor));
            if failures > 0 {
                report_error(&self.config, EngineError::Aggregate(failures));
            }
        }

        let to_start: Vec<K> = {
            let running = self.running.lock().unwrap();
            desired
                .keys()
                .filter(|k| !running.contains_key(k))
                .cloned()
                .collect()
        };

        for key in to_start {
            if *self.status.lock().unwrap() != Status::Running {
                break;
            }
            let descriptor = desired.get(&key).expect("key drawn from desired").clone();
            let handle = self.run_effect.run(&descriptor, &state, &key).await;

            let marker = Arc::new(());
            {
                let mut running = self.running.lock().unwrap();
                if *self.status.lock().unwrap() != Status::Running {
                    break;
                }
                running.insert(
                    key.clone(),
                    RunningEffect {
                        descriptor: descriptor.clone(),
                        cancel: handle.cancel,
                        marker: marker.clone(),
                    },
                );
            }
            tracing::debug!(key = ?key, "effect started");
            let failures = self
                .events
                .publish(&Event::EffectStarted(key.clone(), descriptor));
            if failures > 0 {
                report_error(&self.config, EngineError::Aggregate(failures));
            }

            let weak_marker = Arc::downgrade(&marker);
            let dispatch = self.dispatch.clone();
            let guarded: reflex_types::GuardedDispatch<Sig> = Arc::new(move |sig: Sig| {
                if weak_marker.upgrade().is_some() {
                    dispatch(sig);
                }
            });

            self.in_flight.fetch_add(1, Ordering::SeqCst);
            let this = self.clone();
            let key_for_task = key.clone();
            tokio::spawn(async move {
                let result = (handle.start)(guarded).await;

                let removed = {
                    let mut running = this.running.lock().unwrap();
                    match running.get(&key_for_task) {
                        Some(existing) if Arc::ptr_eq(&existing.marker, &marker) => {
                            running.remove(&key_for_task)
                        }
                        _ => None,
                    }
                };

                if removed.is_some() {
                    if let Err(err) = result {
                        this.report_effect_failure(err);
                    }
                }

                this.in_flight.fetch_sub(1, Ordering::SeqCst);
                this.braking_notify.notify_waiters();
            });
        }
    }

    fn report_effect_failure(&self, err: EffectError) {
        report_error(&self.config, EngineError::EffectFailed { source: err });
    }
}
