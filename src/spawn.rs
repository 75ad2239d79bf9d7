//! A cloneable, type-erased `fibers::Spawn`, threaded through construction
//! instead of a process-wide executor global (spec.md §9 "global-state
//! configuration reads become a configuration struct passed into the
//! Supervisor at construction").
use fibers::Spawn;
use futures::Future;
use std::sync::Arc;

/// Dyn-compatible facade over `fibers::Spawn`'s single object-safe method,
/// since `fibers::Spawn` itself has generic methods and cannot be used as
/// `dyn Spawn` directly.
trait SpawnBoxed: Send + Sync {
    fn spawn_boxed(&self, fiber: Box<Future<Item = (), Error = ()> + Send>);
}
impl<S: Spawn + Send + Sync> SpawnBoxed for S {
    fn spawn_boxed(&self, fiber: Box<Future<Item = (), Error = ()> + Send>) {
        Spawn::spawn_boxed(self, fiber)
    }
}

/// Shares one executor handle across the Supervisor and every actor or
/// endpoint-termination watcher it starts.
#[derive(Clone)]
pub struct ArcSpawn(Arc<SpawnBoxed + Send + Sync + 'static>);
impl ArcSpawn {
    /// Wraps any `fibers::Spawn` implementation (typically a
    /// `fibers::Executor`'s handle) for sharing by `Clone`.
    pub fn new<S>(spawner: S) -> Self
    where
        S: Spawn + Send + Sync + 'static,
    {
        ArcSpawn(Arc::new(spawner))
    }
}
impl Spawn for ArcSpawn {
    fn spawn_boxed(&self, f: Box<Future<Item = (), Error = ()> + Send>) {
        SpawnBoxed::spawn_boxed(&*self.0, f)
    }
}
