//! Runtime configuration surface for the reconciliation engine.
//!
//! Mirrors the shape of a small builder struct with `Default` plus
//! fluent setters: construct with `EngineConfig::default()` and
//! override only the knobs a caller actually cares about.

use reflex_types::ErrorSink;

/// Controls the few knobs the core exposes. See SPEC_FULL.md §7B.
#[derive(Clone)]
pub struct EngineConfig {
    error_sink: Option<ErrorSink>,
    flush_yields: usize,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("error_sink", &self.error_sink.is_some())
            .field("flush_yields", &self.flush_yields)
            .finish()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            error_sink: None,
            flush_yields: 1,
        }
    }
}

impl EngineConfig {
    pub fn error_sink(mut self, sink: ErrorSink) -> Self {
        self.error_sink = Some(sink);
        self
    }

    pub fn flush_yields(mut self, yields: usize) -> Self {
        self.flush_yields = yields;
        self
    }

    pub fn get_error_sink(&self) -> Option<&ErrorSink> {
        self.error_sink.as_ref()
    }

    pub fn get_flush_yields(&self) -> usize {
        self.flush_yields
    }
}
