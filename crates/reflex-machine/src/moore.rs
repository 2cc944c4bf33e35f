//! The `moore()` convenience constructor: treats a pure function of
//! state alone as an `effects_at` (SPEC_FULL.md §4.5).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use reflex_core::EngineConfig;
use reflex_types::{RunEffect, Transition};

use crate::facade::Machine;

/// Adapts a Moore output value into the keyed map `effects_at`
/// expects. Implemented for the shapes a caller is likely to already
/// have lying around; implement it for your own output type to use
/// `moore()` with it directly.
pub trait MooreOutput<K, E>
where
    K: Eq + Hash + Clone,
{
    fn into_keyed(self) -> HashMap<K, E>;
}

impl<K, E> MooreOutput<K, E> for HashMap<K, E>
where
    K: Eq + Hash + Clone,
{
    fn into_keyed(self) -> HashMap<K, E> {
        self
    }
}

impl<K, E> MooreOutput<K, E> for Vec<(K, E)>
where
    K: Eq + Hash + Clone,
{
    fn into_keyed(self) -> HashMap<K, E> {
        self.into_iter().collect()
    }
}

impl<K, E> MooreOutput<K, E> for Option<(K, E)>
where
    K: Eq + Hash + Clone,
{
    fn into_keyed(self) -> HashMap<K, E> {
        self.into_iter().collect()
    }
}

/// Builds a `Machine` from a state transition and a pure Moore output
/// function, treating the output's keys as the declared effect set.
/// A thin adapter over `Machine::new` for callers who think in terms
/// of "what should be true of state" rather than "what effects run".
pub fn moore<S, Sig, K, E, T, F, V, R>(
    initial: S,
    transition: T,
    output: F,
    run_effect: R,
    config: EngineConfig,
) -> Arc<Machine<S, Sig, K, E>>
where
    S: Send + Sync + 'static,
    Sig: Clone + Send + Sync + 'static,
    K: Eq + Hash + Clone + std::fmt::Debug + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    T: Transition<S, Sig> + Send + Sync + 'static,
    F: Fn(&S) -> V + Send + Sync + 'static,
    V: MooreOutput<K, E>,
    R: RunEffect<S, K, E, Sig> + Send + Sync + 'static,
{
    let effects_at = move |state: &S| output(state).into_keyed();
    Machine::new(initial, transition, effects_at, run_effect, config)
}
