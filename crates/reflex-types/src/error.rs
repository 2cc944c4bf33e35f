//! Error kinds surfaced by the reconciliation engine.
//!
//! `EngineError` is the one type that ever reaches the optional error
//! sink (see `EngineConfig::error_sink` in `reflex-core`). Effect authors
//! never construct it directly — they return `EffectError` from their
//! `start`/`run` implementations, and the controller wraps that into
//! `EngineError::EffectFailed`.

use std::fmt;

/// Coarse category for a failure inside an effect's `start` function.
///
/// Intentionally coarse: used for logging and for any policy a caller
/// layers on top (e.g. retry), not for core decision-making — the core
/// always treats an `Err` the same way regardless of kind (§7).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EffectErrorKind {
    /// The effect's own async body returned an application error.
    Failed,
    /// The effect's future was aborted by the runtime (e.g. panic
    /// caught at the task boundary).
    Aborted,
}

/// Structured error returned by an effect's `start` function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EffectError {
    pub kind: EffectErrorKind,
    pub message: String,
}

impl EffectError {
    pub fn new(kind: EffectErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(EffectErrorKind::Failed, message)
    }
}

impl fmt::Display for EffectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for EffectError {}

/// The error channel's payload (§7).
///
/// Every variant maps to exactly one row of the error table in §7 of
/// the design. None of these ever propagate back through `dispatch` —
/// they are either handed to the configured `ErrorSink` or logged via
/// `tracing::error!` and otherwise swallowed.
#[derive(Clone, Debug, thiserror::Error)]
pub enum EngineError {
    /// `transition.apply` panicked; state was left unchanged.
    #[error("transition panicked: {message}")]
    TransitionFailed { message: String },

    /// `effects_at.compute` panicked; the running set was left unchanged.
    #[error("effects_at panicked: {message}")]
    EffectsAtFailed { message: String },

    /// An effect's `start` future resolved to `Err`.
    #[error("effect failed: {source}")]
    EffectFailed { source: EffectError },

    /// An effect's `cancel` callback panicked.
    #[error("cancel panicked: {message}")]
    CancelPanicked { message: String },

    /// `effects_at` returned two entries with the same key in one pass.
    #[error("duplicate effect key in a single reconciliation pass")]
    DuplicateEffectKey,

    /// More than one subscriber handler failed during the same publish.
    #[error("{0} handler(s) failed during publish")]
    Aggregate(usize),
}

/// A sink that receives every `EngineError` as it is raised.
///
/// Set via `EngineConfig::error_sink`. If unset, errors are only
/// mirrored to `tracing::error!` (see §7A).
pub type ErrorSink = std::sync::Arc<dyn Fn(&EngineError) + Send + Sync>;
