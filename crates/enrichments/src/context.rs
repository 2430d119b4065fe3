//! Ambient per-request context carried by the tokio task that runs the
//! request.
//!
//! Every [`run_with`] call establishes a fresh mapping for the future it
//! drives. Nested calls shadow the outer mapping until they complete. Tasks
//! spawned through [`spawn`] share the mapping of the task that spawned them;
//! plain `tokio::spawn` starts without a context.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;

pub type ContextMap = Map<String, Value>;

type SharedContext = Arc<Mutex<ContextMap>>;

tokio::task_local! {
    static CURRENT: SharedContext;
}

/// Drive `work` with a fresh context seeded from `seed`.
pub async fn run_with<F>(seed: ContextMap, work: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(Arc::new(Mutex::new(seed)), work).await
}

/// Synchronous counterpart of [`run_with`].
pub fn run_with_sync<R>(seed: ContextMap, work: impl FnOnce() -> R) -> R {
    CURRENT.sync_scope(Arc::new(Mutex::new(seed)), work)
}

pub fn is_established() -> bool {
    CURRENT.try_with(|_| ()).is_ok()
}

/// Copy of the ambient mapping, empty when no context is established.
pub fn current() -> ContextMap {
    CURRENT
        .try_with(|ctx| ctx.lock().clone())
        .unwrap_or_default()
}

/// Shallow-merge `partial` into the ambient mapping. No-op without a context.
pub fn merge(partial: ContextMap) {
    let _ = CURRENT.try_with(|ctx| {
        let mut guard = ctx.lock();
        for (key, value) in partial {
            guard.insert(key, value);
        }
    });
}

/// Run `f` against the live ambient mapping. `None` without a context.
pub(crate) fn update<R>(f: impl FnOnce(&mut ContextMap) -> R) -> Option<R> {
    CURRENT.try_with(|ctx| f(&mut ctx.lock())).ok()
}

/// Wrap `work` so it observes the caller's context wherever it is polled.
pub fn propagate<F>(work: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    let shared = CURRENT.try_with(Arc::clone).ok();
    async move {
        match shared {
            Some(ctx) => CURRENT.scope(ctx, work).await,
            None => work.await,
        }
    }
}

/// `tokio::spawn` that carries the current context into the new task.
pub fn spawn<F>(work: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(propagate(work))
}
