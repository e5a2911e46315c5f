//! axum binding: one POST route carrying encoded envelopes.
//!
//! The per-call context is the request line and headers. Successful calls
//! answer 200 with the encoded result; failures answer the error's status
//! with the [`ApplicationError`](missive_core::ApplicationError) as JSON.

use crate::{Server, ServerConfig};
use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use missive_core::Error;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};

/// What a handler sees of the HTTP request that carried its call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl RequestContext {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Routes `route` to `server`, plus `GET /health`.
pub fn router(server: Server<RequestContext>, route: &str) -> Router {
    Router::new()
        .route(route, post(handle_call))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(server)
}

/// Binds `config.addr()` and serves until the listener fails.
pub async fn serve(server: Server<RequestContext>, config: ServerConfig) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.addr()).await?;
    serve_with_listener(listener, server, &config.route).await
}

pub async fn serve_with_listener(
    listener: TcpListener,
    server: Server<RequestContext>,
    route: &str,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(
        interface = server.interface().name(),
        endpoint = %format!("http://{}{}", addr, route),
        "missive server listening"
    );
    axum::serve(listener, router(server, route)).await
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn handle_call(
    State(server): State<Server<RequestContext>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    debug!(bytes = body.len(), "received envelope");
    let ctx = RequestContext {
        method,
        uri,
        headers,
    };

    let result = server.process_payload(&body, ctx).await;
    let encoded = result.and_then(|value| server.codec().encode_value(&value));
    match encoded {
        Ok(payload) => (
            StatusCode::OK,
            [(CONTENT_TYPE, server.codec().content_type())],
            payload,
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &Error) -> Response {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    debug!(status = status.as_u16(), error = %err, "call failed");
    (status, Json(err.to_application_error())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use missive_core::{ApplicationError, Interface, Method as Op};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const ADD: Op<(i64, i64), i64> = Op::new("add");
    const WHOAMI: Op<(), String> = Op::new("whoami");
    const DIVIDE: Op<(i64, i64), i64> = Op::new("divide");

    async fn add(a: i64, b: i64) -> Result<i64, ApplicationError> {
        Ok(a + b)
    }

    async fn whoami(ctx: RequestContext) -> Result<String, ApplicationError> {
        ctx.header("x-user")
            .map(str::to_string)
            .ok_or_else(|| ApplicationError::permission_denied("anonymous"))
    }

    async fn divide(a: i64, b: i64) -> Result<i64, ApplicationError> {
        a.checked_div(b)
            .ok_or_else(|| ApplicationError::bad_request("division by zero"))
    }

    fn app() -> Router {
        let interface = Interface::builder("Calculator")
            .operation(ADD.descriptor())
            .and_then(|b| b.operation(WHOAMI.descriptor()))
            .and_then(|b| b.operation(DIVIDE.descriptor()))
            .unwrap()
            .build();
        let server = Server::<RequestContext>::builder(interface)
            .implement(&ADD, add)
            .implement(&WHOAMI, whoami)
            .implement(&DIVIDE, divide)
            .build()
            .unwrap();
        router(server, "/rpc")
    }

    async fn post(body: &str, user: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::post("/rpc").header(CONTENT_TYPE, "application/json");
        if let Some(user) = user {
            request = request.header("x-user", user);
        }
        let response = app()
            .oneshot(request.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_success_is_200_with_result() {
        let (status, body) = post(r#"{"name": "add", "args": [1, 2]}"#, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(3));
    }

    #[tokio::test]
    async fn test_context_carries_headers() {
        let (status, body) = post(r#"{"name": "whoami", "args": []}"#, Some("ada")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("ada"));

        let (status, body) = post(r#"{"name": "whoami", "args": []}"#, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "permission_denied");
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let (status, body) = post(r#"{"name": "missing", "args": []}"#, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");

        let (status, _) = post("{", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post(r#"{"name": "add", "args": ["1", 2]}"#, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = post(r#"{"name": "divide", "args": [1, 0]}"#, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "division by zero");
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
