pub mod facade;
pub mod moore;

pub use facade::Machine;
pub use moore::{moore, MooreOutput};

pub use reflex_core::EngineConfig;
pub use reflex_types::{
    EffectError, EffectErrorKind, EffectHandle, EffectsAt, EngineError, Event, RunEffect,
    Transition, Unsubscribe,
};
