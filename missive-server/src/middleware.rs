use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use missive_core::{Call, Error, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// The rest of the pipeline after one interceptor.
pub(crate) type Continuation<Ctx> =
    Arc<dyn Fn(Ctx, Call) -> BoxFuture<'static, Result<Value, Error>> + Send + Sync>;

/// Handle on the remainder of the chain, passed to each interceptor.
pub struct Next<Ctx> {
    inner: Continuation<Ctx>,
}

impl<Ctx> Next<Ctx> {
    pub(crate) fn new(inner: Continuation<Ctx>) -> Self {
        Self { inner }
    }

    /// Runs the remaining interceptors and the handler.
    pub async fn run(self, ctx: Ctx, call: Call) -> Result<Value, Error> {
        (self.inner)(ctx, call).await
    }
}

impl<Ctx> Clone for Next<Ctx> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Ctx> fmt::Debug for Next<Ctx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

/// An interceptor wrapping handler invocation.
///
/// Code before `next.run(..)` runs before the handler, code after it runs
/// once the handler (and every inner interceptor) has finished. The
/// interceptor may rewrite the context or the envelope before passing them
/// on, rewrite or replace the result, or return without calling `next` at
/// all.
#[async_trait]
pub trait Middleware<Ctx: Send + 'static>: Send + Sync + 'static {
    async fn handle(&self, ctx: Ctx, call: Call, next: Next<Ctx>) -> Result<Value, Error>;
}

#[async_trait]
impl<Ctx, F, Fut> Middleware<Ctx> for F
where
    Ctx: Send + 'static,
    F: Fn(Ctx, Call, Next<Ctx>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, Error>> + Send + 'static,
{
    async fn handle(&self, ctx: Ctx, call: Call, next: Next<Ctx>) -> Result<Value, Error> {
        (self)(ctx, call, next).await
    }
}

/// Right-folds `layers` onto `terminal`, so the first layer is outermost.
pub(crate) fn fold_chain<Ctx>(
    layers: &[Arc<dyn Middleware<Ctx>>],
    terminal: Continuation<Ctx>,
) -> Continuation<Ctx>
where
    Ctx: Send + 'static,
{
    layers.iter().rev().fold(terminal, |next, layer| {
        let layer = Arc::clone(layer);
        let step: Continuation<Ctx> = Arc::new(move |ctx: Ctx, call: Call| {
            let layer = Arc::clone(&layer);
            let next = Next::new(Arc::clone(&next));
            async move { layer.handle(ctx, call, next).await }.boxed()
        });
        step
    })
}
