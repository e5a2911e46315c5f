//! Envelope-over-HTTP client transport.
//!
//! Each call is one `POST` whose body is the encoded envelope. A 2xx reply
//! carries the encoded result; anything else becomes [`Error::Transport`]
//! with the status and the raw body.

use crate::{AccessToken, AuthorizedSend, Connector, Transport};
use async_trait::async_trait;
use missive_core::{Call, Codec, Error, JsonCodec, Operation, Value};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client as HttpClient;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// HTTP transport configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Endpoint receiving the envelopes
    pub url: String,
    /// Total time budget for one call, connect included
    pub timeout: Option<Duration>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000/".to_string(),
            timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl HttpConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn build_client(&self) -> Result<HttpClient, Error> {
        let mut builder = HttpClient::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))
    }
}

/// Maps a `reqwest` failure onto the call error model.
pub fn map_http_error(err: reqwest::Error, timeout: Option<Duration>) -> Error {
    if err.is_timeout() {
        Error::Timeout(timeout.unwrap_or_default())
    } else {
        Error::Unreachable(err.to_string())
    }
}

/// Sends one envelope on an already-open HTTP session.
///
/// The default is [`PostEnvelope`]; adapters that speak a foreign HTTP API
/// supply their own and reuse the pooled client.
#[async_trait]
pub trait HttpSend: Send + Sync + 'static {
    async fn send(
        &self,
        http: &HttpClient,
        call: &Call,
        operation: &Operation,
    ) -> Result<Value, Error>;
}

pub(crate) async fn post_envelope(
    http: &HttpClient,
    url: &str,
    codec: &dyn Codec,
    call: &Call,
    bearer: Option<&str>,
    timeout: Option<Duration>,
) -> Result<Value, Error> {
    let body = codec.encode_call(call)?;

    debug!(url, operation = call.name(), bytes = body.len(), "sending envelope");

    let mut request = http
        .post(url)
        .header(CONTENT_TYPE, codec.content_type())
        .body(body);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .map_err(|e| map_http_error(e, timeout))?;

    let status = response.status();
    let payload = response
        .bytes()
        .await
        .map_err(|e| map_http_error(e, timeout))?;

    if !status.is_success() {
        warn!(url, operation = call.name(), status = status.as_u16(), "endpoint rejected call");
        return Err(Error::transport(status.as_u16(), payload));
    }

    trace!(operation = call.name(), bytes = payload.len(), "received result");
    codec.decode_value(&payload)
}

/// POSTs the encoded envelope to a fixed URL.
#[derive(Debug, Clone)]
pub struct PostEnvelope {
    url: String,
    codec: Arc<dyn Codec>,
    timeout: Option<Duration>,
}

impl PostEnvelope {
    pub fn new(config: &HttpConfig) -> Self {
        Self {
            url: config.url.clone(),
            codec: Arc::new(JsonCodec),
            timeout: config.timeout,
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }
}

#[async_trait]
impl HttpSend for PostEnvelope {
    async fn send(
        &self,
        http: &HttpClient,
        call: &Call,
        _operation: &Operation,
    ) -> Result<Value, Error> {
        post_envelope(http, &self.url, self.codec.as_ref(), call, None, self.timeout).await
    }
}

/// Opens an [`HttpTransport`]: one pooled client per proxy.
#[derive(Debug)]
pub struct HttpConnector<S = PostEnvelope> {
    config: HttpConfig,
    sender: S,
}

impl HttpConnector<PostEnvelope> {
    pub fn new(config: HttpConfig) -> Self {
        let sender = PostEnvelope::new(&config);
        Self { config, sender }
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self::new(HttpConfig::new(url))
    }
}

impl<S: HttpSend> HttpConnector<S> {
    /// Uses `sender` instead of the envelope POST for every call.
    pub fn with_sender(config: HttpConfig, sender: S) -> Self {
        Self { config, sender }
    }
}

#[async_trait]
impl<S: HttpSend> Connector for HttpConnector<S> {
    type Transport = HttpTransport<S>;

    async fn connect(self) -> Result<Self::Transport, Error> {
        let http = self.config.build_client()?;
        debug!(url = %self.config.url, "opened HTTP transport");
        Ok(HttpTransport {
            http,
            sender: self.sender,
            closed: AtomicBool::new(false),
        })
    }
}

#[derive(Debug)]
pub struct HttpTransport<S = PostEnvelope> {
    http: HttpClient,
    sender: S,
    closed: AtomicBool,
}

#[async_trait]
impl<S: HttpSend> Transport for HttpTransport<S> {
    async fn send(&self, call: &Call, operation: &Operation) -> Result<Value, Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        self.sender.send(&self.http, call, operation).await
    }

    async fn close(&self) -> Result<(), Error> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("closed HTTP transport");
        }
        Ok(())
    }
}

/// Envelope POST carrying an `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct BearerSender {
    http: HttpClient,
    post: PostEnvelope,
}

impl BearerSender {
    pub fn new(config: &HttpConfig) -> Result<Self, Error> {
        Ok(Self {
            http: config.build_client()?,
            post: PostEnvelope::new(config),
        })
    }
}

#[async_trait]
impl AuthorizedSend for BearerSender {
    async fn send(
        &self,
        call: &Call,
        _operation: &Operation,
        token: &AccessToken,
    ) -> Result<Value, Error> {
        post_envelope(
            &self.http,
            &self.post.url,
            self.post.codec.as_ref(),
            call,
            Some(&token.access_token),
            self.post.timeout,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn add() -> (Call, Operation) {
        (
            Call::new("add", vec![json!(1), json!(2)]),
            Operation::new("add", vec!["i64", "i64"], "i64"),
        )
    }

    #[tokio::test]
    async fn test_posts_envelope_and_decodes_result() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({"name": "add", "args": [1, 2]})))
            .with_status(200)
            .with_body("3")
            .expect(1)
            .create_async()
            .await;

        let transport = HttpConnector::with_url(format!("{}/", server.url()))
            .connect()
            .await
            .unwrap();
        let (call, op) = add();
        assert_eq!(transport.send(&call, &op).await.unwrap(), json!(3));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_transport_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let transport = HttpConnector::with_url(format!("{}/", server.url()))
            .connect()
            .await
            .unwrap();
        let (call, op) = add();
        match transport.send(&call, &op).await {
            Err(Error::Transport { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(&body[..], b"boom");
            }
            other => panic!("expected transport error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;

        let transport = HttpConnector::with_url(format!("{}/", server.url()))
            .connect()
            .await
            .unwrap();
        let (call, op) = add();
        match transport.send(&call, &op).await {
            Err(Error::Parse { payload, .. }) => assert_eq!(&payload[..], b"<html>"),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        // Port 9 (discard) is not listening in test environments.
        let transport = HttpConnector::with_url("http://127.0.0.1:9/")
            .connect()
            .await
            .unwrap();
        let (call, op) = add();
        assert!(matches!(
            transport.send(&call, &op).await,
            Err(Error::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_send_after_close() {
        let transport = HttpConnector::with_url("http://127.0.0.1:9/")
            .connect()
            .await
            .unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        let (call, op) = add();
        assert!(matches!(transport.send(&call, &op).await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_bearer_sender_sets_authorization() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rpc")
            .match_header("authorization", "Bearer abc")
            .with_status(200)
            .with_body("3")
            .create_async()
            .await;

        let sender = BearerSender::new(&HttpConfig::new(format!("{}/rpc", server.url()))).unwrap();
        let token = AccessToken::new("abc", "Bearer", 3600);
        let (call, op) = add();
        assert_eq!(
            AuthorizedSend::send(&sender, &call, &op, &token).await.unwrap(),
            json!(3)
        );
        mock.assert_async().await;
    }
}
