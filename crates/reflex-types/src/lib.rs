pub mod effect;
pub mod error;
pub mod event;
pub mod transition;

pub use effect::{EffectHandle, GuardedDispatch, RunEffect, Start};
pub use error::{EffectError, EffectErrorKind, EngineError};
pub use event::{Event, Handler, Unsubscribe};
pub use transition::{EffectsAt, Transition};
