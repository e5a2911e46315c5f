//! Server side of missive: handler registry, interceptor chain, dispatch,
//! and the HTTP, stream and in-process bindings.

pub mod config;
pub mod handler;
pub mod http;
pub mod interceptors;
pub mod local;
pub mod logging;
pub mod middleware;
pub mod server;
pub mod stream;

pub use config::ServerConfig;
pub use handler::{Handler, WithContext, WithoutContext};
pub use http::{router, serve, serve_with_listener, RequestContext};
pub use interceptors::{RateLimitMiddleware, TracingMiddleware};
pub use local::{LocalConnector, LocalTransport};
pub use logging::{init_logging, init_test_logging};
pub use middleware::{Middleware, Next};
pub use server::{Server, ServerBuilder};
pub use stream::{serve_stream, serve_tcp};
