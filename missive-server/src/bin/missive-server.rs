//! Calculator served over the HTTP binding.
//!
//! Listens on `MISSIVE_HOST:MISSIVE_PORT` (default `127.0.0.1:8080`) at
//! `MISSIVE_ROUTE` (default `/rpc`).

use anyhow::Result;
use missive_core::{ApplicationError, Interface, Method};
use missive_server::{
    init_logging, serve, RateLimitMiddleware, RequestContext, Server, ServerConfig,
    TracingMiddleware,
};
use nonzero_ext::nonzero;
use tracing::info;

const ADD: Method<(i64, i64), i64> = Method::new("add");
const CALL_NONE: Method<(), i64> = Method::new("call_none");
const CALL_ONE: Method<(i64,), i64> = Method::new("call_one");
const DIVIDE: Method<(f64, f64), f64> = Method::new("divide");
const ECHO_AGENT: Method<(), Option<String>> = Method::new("echo_agent");

async fn add(a: i64, b: i64) -> Result<i64, ApplicationError> {
    a.checked_add(b)
        .ok_or_else(|| ApplicationError::bad_request("integer overflow"))
}

async fn call_none() -> Result<i64, ApplicationError> {
    Ok(1)
}

async fn call_one(i: i64) -> Result<i64, ApplicationError> {
    Ok(i)
}

async fn divide(a: f64, b: f64) -> Result<f64, ApplicationError> {
    if b == 0.0 {
        return Err(ApplicationError::bad_request("division by zero"));
    }
    Ok(a / b)
}

async fn echo_agent(ctx: RequestContext) -> Result<Option<String>, ApplicationError> {
    Ok(ctx.header("user-agent").map(str::to_string))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_logging("logs", "missive-server")?;
    let config = ServerConfig::from_env()?;

    let interface = Interface::builder("Calculator")
        .operation(ADD.descriptor())?
        .operation(CALL_NONE.descriptor())?
        .operation(CALL_ONE.descriptor())?
        .operation(DIVIDE.descriptor())?
        .operation(ECHO_AGENT.descriptor())?
        .build();

    let server = Server::<RequestContext>::builder(interface)
        .middleware(TracingMiddleware)
        .middleware(RateLimitMiddleware::per_second(nonzero!(100u32)))
        .implement(&ADD, add)
        .implement(&CALL_NONE, call_none)
        .implement(&CALL_ONE, call_one)
        .implement(&DIVIDE, divide)
        .implement(&ECHO_AGENT, echo_agent)
        .build()?;

    for op in server.interface().operations() {
        info!("  {}", op);
    }

    serve(server, config).await?;
    Ok(())
}
