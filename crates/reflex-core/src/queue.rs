//! Coalesces dispatched signals into microtask-equivalent batches
//! (SPEC_FULL.md §4.2).
//!
//! A "flush" here is approximated by `flush_yields` cooperative
//! `tokio::task::yield_now` calls rather than a literal JS microtask;
//! see `EngineConfig::flush_yields`.

use std::sync::{Arc, Mutex};

struct QueueState<Sig> {
    pending: Vec<Sig>,
    flush_in_flight: bool,
}

/// `schedule(sig)` accumulates signals and hands each accumulated batch
/// to `sink` in one call, in scheduling order. A `schedule` call made
/// while `sink` is running joins the *next* batch.
pub struct SignalQueue<Sig> {
    state: Mutex<QueueState<Sig>>,
    flush_yields: usize,
    sink: Arc<dyn Fn(Vec<Sig>) + Send + Sync>,
}

impl<Sig> SignalQueue<Sig>
where
    Sig: Send + 'static,
{
    pub fn new(flush_yields: usize, sink: Arc<dyn Fn(Vec<Sig>) + Send + Sync>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState {
                pending: Vec::new(),
                flush_in_flight: false,
            }),
            flush_yields,
            sink,
        })
    }

    /// Enqueues `sig`. Spawns a flush task if one is not already
    /// pending; otherwise the signal rides the in-flight batch's
    /// successor.
    pub fn schedule(self: &Arc<Self>, sig: Sig) {
        let mut state = self.state.lock().unwrap();
        state.pending.push(sig);
        if state.flush_in_flight {
            return;
        }
        state.flush_in_flight = true;
        drop(state);

        let this = self.clone();
        tokio::spawn(async move {
            this.run_flush_loop().await;
        });
    }

    async fn run_flush_loop(self: Arc<Self>) {
        loop {
            for _ in 0..self.flush_yields {
                tokio::task::yield_now().await;
            }

            let batch = {
                let mut state = self.state.lock().unwrap();
                std::mem::take(&mut state.pending)
            };
            tracing::trace!(batch_size = batch.len(), "flushing signal queue");
            (self.sink)(batch);

            let mut state = self.state.lock().unwrap();
            if state.pending.is_empty() {
                state.flush_in_flight = false;
                break;
            }
        }
    }
}
