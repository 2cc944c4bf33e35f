//! The two pure functions a caller supplies: `transition` and `effects_at`.
//!
//! Both are plain traits with blanket implementations for closures so
//! that most callers never name the trait — `Automaton::new(initial,
//! |sig, state| ...)` just works — while still giving the core a named
//! seam to document purity requirements against (§4.3, §4.4).

use std::collections::HashMap;
use std::hash::Hash;

/// Folds one signal into a new state. Must be pure: same `(signal,
/// state)` in, same state out, no side effects, no capture of mutable
/// outer references.
///
/// A panic inside `apply` is caught at the flush boundary and reported
/// as `EngineError::TransitionFailed`; the previous state is kept.
pub trait Transition<S, Sig>: Send + Sync {
    fn apply(&self, signal: &Sig, state: &S) -> S;
}

impl<S, Sig, F> Transition<S, Sig> for F
where
    F: Fn(&Sig, &S) -> S + Send + Sync,
{
    fn apply(&self, signal: &Sig, state: &S) -> S {
        self(signal, state)
    }
}

/// Computes the set of effects that should be running for a given
/// state. Must be pure and is called at most once per observed state
/// during a reconciliation pass (§4.4).
///
/// A panic inside `compute` is caught and reported as
/// `EngineError::EffectsAtFailed`; the running set is left unchanged.
pub trait EffectsAt<S, K, E>: Send + Sync
where
    K: Eq + Hash,
{
    fn compute(&self, state: &S) -> HashMap<K, E>;
}

impl<S, K, E, F> EffectsAt<S, K, E> for F
where
    K: Eq + Hash,
    F: Fn(&S) -> HashMap<K, E> + Send + Sync,
{
    fn compute(&self, state: &S) -> HashMap<K, E> {
        self(state)
    }
}
