//! The effect contract: what a caller hands to the `EffectController`
//! and gets back for each declared effect (§4.4, §6).

use futures::future::BoxFuture;

use crate::error::EffectError;

/// A dispatch callback bound to one running-effect entry.
///
/// Calling it after the entry has been removed (cancelled or
/// completed) is a silent no-op — this is what §3 invariant 4 calls
/// "guarded dispatch". Effect authors never construct this themselves;
/// the `EffectController` builds one per running effect and passes it
/// into `start`.
pub type GuardedDispatch<Sig> = std::sync::Arc<dyn Fn(Sig) + Send + Sync>;

/// The future an effect's `start` function produces.
pub type EffectFuture = BoxFuture<'static, Result<(), EffectError>>;

/// `start(dispatch) -> Future<Result<(), EffectError>>` from §6.
///
/// `FnOnce` because a given running-effect entry is started exactly
/// once; if the key disappears and reappears, a fresh `EffectHandle` is
/// obtained from `RunEffect::run` rather than this closure being
/// reused.
pub type Start<Sig> = Box<dyn FnOnce(GuardedDispatch<Sig>) -> EffectFuture + Send>;

/// `cancel() -> ()` from §6. Must be idempotent and must not panic; a
/// panicking cancel is caught by the controller and reported as
/// `EngineError::CancelPanicked` rather than propagated.
pub type Cancel = Box<dyn FnMut() + Send>;

/// What `RunEffect::run` produces for one observed `(descriptor, key)`
/// pair.
pub struct EffectHandle<Sig> {
    pub start: Start<Sig>,
    pub cancel: Cancel,
}

impl<Sig> EffectHandle<Sig> {
    pub fn new(start: Start<Sig>, cancel: Cancel) -> Self {
        Self { start, cancel }
    }
}

/// Constructs the work that should be running for one effect
/// descriptor.
///
/// Implementations are free to do async setup (acquire a connection,
/// look up a cached value) before returning the handle; the handle's
/// `start` is what actually runs once inserted into the running map.
#[async_trait::async_trait]
pub trait RunEffect<S, K, E, Sig>: Send + Sync
where
    S: Send + Sync,
    K: Send + Sync,
    E: Send + Sync,
    Sig: Send + 'static,
{
    async fn run(&self, descriptor: &E, state: &S, key: &K) -> EffectHandle<Sig>;
}
