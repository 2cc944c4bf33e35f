//! Synchronous publish/subscribe plus a derived lazy pull stream
//! (SPEC_FULL.md §4.1).

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::Stream;
use reflex_types::Unsubscribe;
use tokio_stream::wrappers::WatchStream;

type SubHandler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A mapping from a monotonically increasing token to a handler.
///
/// Always used behind an `Arc` so that `Unsubscribe` tokens can hold a
/// weak back-reference without keeping the pubsub itself alive.
pub struct PubSub<T> {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, SubHandler<T>)>>,
}

impl<T> PubSub<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(0),
            handlers: Mutex::new(Vec::new()),
        })
    }

    /// Registers `handler`; invoked synchronously, in insertion order,
    /// on every later `publish`. Dropping or calling the returned
    /// `Unsubscribe` removes it.
    pub fn subscribe(
        self: &Arc<Self>,
        handler: impl Fn(&T) + Send + Sync + 'static,
    ) -> Unsubscribe {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .lock()
            .unwrap()
            .push((id, Arc::new(handler) as SubHandler<T>));

        let weak = Arc::downgrade(self);
        Unsubscribe::new(Box::new(move || {
            if let Some(strong) = weak.upgrade() {
                strong.handlers.lock().unwrap().retain(|(hid, _)| *hid != id);
            }
        }))
    }

    /// Invokes every handler current at the moment of the call, in
    /// insertion order. A handler that subscribes another handler
    /// during this call does not deliver `value` to the new
    /// subscriber; a handler that unsubscribes itself is still invoked
    /// for this call. Returns the number of handlers whose invocation
    /// panicked (the caller folds this into `EngineError::Aggregate`).
    pub fn publish(&self, value: &T) -> usize {
        let snapshot: Vec<_> = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, h)| h.clone())
            .collect();

        let mut failures = 0;
        for handler in snapshot {
            let value = value;
            let result =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(value)));
            if result.is_err() {
                failures += 1;
            }
        }
        failures
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A lazy pull stream derived from a [`PubSub`]: yields `seed` first
/// (if given), then each subsequently published value, overwriting a
/// pending value if the consumer is slower than the publisher.
/// Dropping the stream unsubscribes deterministically.
pub struct PullStream<T> {
    inner: WatchStream<Option<T>>,
    _unsubscribe: Unsubscribe,
}

impl<T> PullStream<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(pubsub: &Arc<PubSub<T>>, seed: Option<T>) -> Self {
        let (tx, rx) = tokio::sync::watch::channel(seed);
        let unsubscribe = pubsub.subscribe(move |value: &T| {
            let _ = tx.send(Some(value.clone()));
        });
        Self {
            inner: WatchStream::new(rx),
            _unsubscribe: unsubscribe,
        }
    }
}

impl<T> Stream for PullStream<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Some(value))) => return Poll::Ready(Some(value)),
                Poll::Ready(Some(None)) => continue,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
