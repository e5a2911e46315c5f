use crate::middleware::{Middleware, Next};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use missive_core::{ApplicationError, Call, Error, Value};
use std::fmt;
use std::num::NonZeroU32;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Opens one span per call and logs how it ended.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMiddleware;

#[async_trait]
impl<Ctx: Send + 'static> Middleware<Ctx> for TracingMiddleware {
    async fn handle(&self, ctx: Ctx, call: Call, next: Next<Ctx>) -> Result<Value, Error> {
        let call_id = Uuid::new_v4();
        let operation = call.name().to_string();
        let span = info_span!("call", operation = %operation, call_id = %call_id);
        let started = Instant::now();

        let result = next.run(ctx, call).instrument(span.clone()).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => info!(parent: &span, elapsed_ms, "call completed"),
            Err(err) => warn!(
                parent: &span,
                elapsed_ms,
                status = err.status(),
                error = %err,
                "call failed"
            ),
        }
        result
    }
}

/// Rejects calls beyond a fixed quota with `resource_exhausted`, without
/// running the rest of the chain.
pub struct RateLimitMiddleware {
    limiter: DefaultDirectRateLimiter,
}

impl RateLimitMiddleware {
    pub fn new(quota: Quota) -> Self {
        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    pub fn per_second(calls: NonZeroU32) -> Self {
        Self::new(Quota::per_second(calls))
    }
}

impl fmt::Debug for RateLimitMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitMiddleware").finish_non_exhaustive()
    }
}

#[async_trait]
impl<Ctx: Send + 'static> Middleware<Ctx> for RateLimitMiddleware {
    async fn handle(&self, ctx: Ctx, call: Call, next: Next<Ctx>) -> Result<Value, Error> {
        if self.limiter.check().is_err() {
            warn!(operation = call.name(), "rate limit exceeded");
            return Err(ApplicationError::resource_exhausted(format!(
                "rate limit exceeded for `{}`",
                call.name()
            ))
            .into());
        }
        next.run(ctx, call).await
    }
}
