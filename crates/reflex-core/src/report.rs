//! Mirrors every `EngineError` to `tracing::error!` and, if configured,
//! to the caller's `ErrorSink` (§7, §7A).

use reflex_types::EngineError;

use crate::config::EngineConfig;

pub(crate) fn report_error(config: &EngineConfig, err: EngineError) {
    tracing::error!(error = %err, "engine error");
    if let Some(sink) = config.get_error_sink() {
        sink(&err);
    }
}
