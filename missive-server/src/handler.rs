//! Handler binding with context adaptation.
//!
//! A handler for an operation declaring `N` parameters is any async function
//! taking either those `N` arguments, or the per-call context followed by
//! them. The two shapes are told apart by the marker type parameter, so both
//! can be registered on the same server:
//!
//! ```ignore
//! async fn add(a: i64, b: i64) -> Result<i64, ApplicationError> { Ok(a + b) }
//! async fn whoami(ctx: RequestContext) -> Result<String, ApplicationError> { .. }
//! ```

use futures::future::{BoxFuture, FutureExt};
use missive_core::{to_value, ApplicationError, Args, Error, Value};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

/// Marker for handlers that take only the declared arguments.
#[derive(Debug, Clone, Copy)]
pub struct WithoutContext;

/// Marker for handlers that take the per-call context first.
#[derive(Debug, Clone, Copy)]
pub struct WithContext;

/// An async function that can serve an operation with arguments `A` and
/// result `R`, given a per-call context of type `Ctx`.
pub trait Handler<Ctx, A, R, M>: Clone + Send + Sync + 'static {
    type Future: Future<Output = Result<R, ApplicationError>> + Send + 'static;

    fn call(&self, ctx: Ctx, args: A) -> Self::Future;
}

macro_rules! impl_handler {
    ($($ty:ident => $var:ident),*) => {
        impl<F, Fut, Ctx, R, $($ty,)*> Handler<Ctx, ($($ty,)*), R, WithoutContext> for F
        where
            F: Fn($($ty),*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Result<R, ApplicationError>> + Send + 'static,
        {
            type Future = Fut;

            fn call(&self, _ctx: Ctx, ($($var,)*): ($($ty,)*)) -> Fut {
                (self)($($var),*)
            }
        }

        impl<F, Fut, Ctx, R, $($ty,)*> Handler<Ctx, ($($ty,)*), R, WithContext> for F
        where
            F: Fn(Ctx, $($ty),*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Result<R, ApplicationError>> + Send + 'static,
        {
            type Future = Fut;

            fn call(&self, ctx: Ctx, ($($var,)*): ($($ty,)*)) -> Fut {
                (self)(ctx, $($var),*)
            }
        }
    };
}

impl_handler!();
impl_handler!(A1 => a1);
impl_handler!(A1 => a1, A2 => a2);
impl_handler!(A1 => a1, A2 => a2, A3 => a3);
impl_handler!(A1 => a1, A2 => a2, A3 => a3, A4 => a4);
impl_handler!(A1 => a1, A2 => a2, A3 => a3, A4 => a4, A5 => a5);
impl_handler!(A1 => a1, A2 => a2, A3 => a3, A4 => a4, A5 => a5, A6 => a6);

/// A handler with its argument and result types erased.
pub(crate) type BoxedHandler<Ctx> =
    Arc<dyn Fn(Ctx, Vec<Value>) -> BoxFuture<'static, Result<Value, Error>> + Send + Sync>;

/// Wraps `handler` so it decodes positional [`Value`]s into `A` and encodes
/// its result back.
pub(crate) fn erase<Ctx, A, R, M, H>(handler: H) -> BoxedHandler<Ctx>
where
    Ctx: Send + 'static,
    A: Args,
    R: Serialize + Send + 'static,
    H: Handler<Ctx, A, R, M>,
{
    Arc::new(move |ctx: Ctx, values: Vec<Value>| {
        let handler = handler.clone();
        async move {
            let args = A::from_values(values)?;
            let result = handler.call(ctx, args).await?;
            to_value(&result)
        }
        .boxed()
    })
}
