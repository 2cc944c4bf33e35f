pub mod automaton;
pub mod config;
pub mod effects;
pub(crate) mod panic;
pub mod pubsub;
pub mod queue;
pub(crate) mod report;

pub use automaton::Automaton;
pub use config::EngineConfig;
pub use effects::EffectController;
pub use pubsub::{PubSub, PullStream};
pub use queue::SignalQueue;
