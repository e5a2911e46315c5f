// One calculator interface served over every binding and called through the
// generated proxy.

use missive_client::interface;
use missive_core::{ApplicationError, Error, ErrorCode, Method};
use missive_server::{
    serve_stream, serve_tcp, serve_with_listener, LocalConnector, RequestContext, Server,
};
use missive_transport::{ConnectorExt, HttpConnector, StreamConnector, TcpConnector};
use std::time::Duration;
use tokio::net::TcpListener;

interface! {
    /// Arithmetic over the wire.
    pub interface Calculator => CalculatorClient {
        fn call_none() -> String;
        fn call_one(i: i64) -> i64;
        fn add(a: i64, b: i64) -> i64;
        fn call_three(i: i64, s: String, f: f64) -> String;
        fn divide(a: f64, b: f64) -> f64;
        fn slow() -> ();
    }
}

interface! {
    pub interface Extended => ExtendedClient {
        fn add(a: i64, b: i64) -> i64;
        fn square(a: i64) -> i64;
    }
}

async fn call_none() -> Result<String, ApplicationError> {
    Ok("none".into())
}

async fn call_one(i: i64) -> Result<i64, ApplicationError> {
    Ok(i)
}

async fn add(a: i64, b: i64) -> Result<i64, ApplicationError> {
    Ok(a + b)
}

async fn call_three(i: i64, s: String, f: f64) -> Result<String, ApplicationError> {
    Ok(format!("{}:{}:{}", i, s, f))
}

async fn divide(a: f64, b: f64) -> Result<f64, ApplicationError> {
    if b == 0.0 {
        return Err(ApplicationError::bad_request("division by zero"));
    }
    Ok(a / b)
}

async fn slow() -> Result<(), ApplicationError> {
    tokio::time::sleep(Duration::from_secs(10)).await;
    Ok(())
}

fn calculator<Ctx: Clone + Send + Sync + 'static>() -> Server<Ctx> {
    Server::<Ctx>::builder(Calculator::descriptor().unwrap())
        .implement(&Calculator::call_none(), call_none)
        .implement(&Calculator::call_one(), call_one)
        .implement(&Calculator::add(), add)
        .implement(&Calculator::call_three(), call_three)
        .implement(&Calculator::divide(), divide)
        .implement(&Calculator::slow(), slow)
        .build()
        .unwrap()
}

async fn http_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = calculator::<RequestContext>();
    tokio::spawn(async move { serve_with_listener(listener, server, "/rpc").await });
    format!("http://{}/rpc", addr)
}

#[tokio::test]
async fn test_local_calls() {
    let client = CalculatorClient::connect(LocalConnector::new(calculator(), ()))
        .await
        .unwrap();

    assert_eq!(client.add(1, 2).await.unwrap(), 3);
    assert_eq!(client.call_none().await.unwrap(), "none");
    assert_eq!(client.call_one(7).await.unwrap(), 7);
    assert_eq!(
        client.call_three(1, "two".into(), 3.5).await.unwrap(),
        "1:two:3.5"
    );
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_http_calls() {
    let url = http_endpoint().await;
    let client = CalculatorClient::connect(HttpConnector::with_url(url))
        .await
        .unwrap();

    assert_eq!(client.add(1, 2).await.unwrap(), 3);
    assert_eq!(client.divide(9.0, 3.0).await.unwrap(), 3.0);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_http_application_error_reaches_caller() {
    let url = http_endpoint().await;
    let client = CalculatorClient::connect(HttpConnector::with_url(url))
        .await
        .unwrap();

    let err = client.divide(1.0, 0.0).await.unwrap_err();
    assert_eq!(err.status(), 400);
    let remote = err.remote_error().unwrap();
    assert_eq!(remote.code, ErrorCode::BadRequest);
    assert_eq!(remote.message, "division by zero");
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_http_concurrent_calls_share_client() {
    let url = http_endpoint().await;
    let client = CalculatorClient::connect(HttpConnector::with_url(url))
        .await
        .unwrap();

    let (a, b, c) = tokio::join!(client.add(1, 2), client.add(10, 20), client.call_one(5));
    assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (3, 30, 5));
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_stream_calls() {
    let (near, far) = tokio::io::duplex(64 * 1024);
    let serving = tokio::spawn(serve_stream(calculator::<()>(), far, ()));

    let client = CalculatorClient::connect(StreamConnector::new(near))
        .await
        .unwrap();
    assert_eq!(client.add(1, 2).await.unwrap(), 3);
    assert_eq!(
        client.call_three(4, "x".into(), 0.5).await.unwrap(),
        "4:x:0.5"
    );
    client.close().await.unwrap();
    drop(client);

    serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_tcp_calls() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_tcp(listener, calculator::<String>(), |peer| {
        peer.to_string()
    }));

    let client = CalculatorClient::connect(TcpConnector::new(addr.to_string()))
        .await
        .unwrap();
    assert_eq!(client.add(1, 2).await.unwrap(), 3);
    assert_eq!(client.call_one(-4).await.unwrap(), -4);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_close_is_idempotent_and_final() {
    let url = http_endpoint().await;
    let client = CalculatorClient::connect(HttpConnector::with_url(url))
        .await
        .unwrap();

    assert_eq!(client.add(2, 2).await.unwrap(), 4);
    client.close().await.unwrap();
    client.close().await.unwrap();
    assert!(matches!(client.add(1, 2).await, Err(Error::Closed)));
}

#[tokio::test]
async fn test_unknown_operation_fails_before_sending() {
    let client = CalculatorClient::connect(LocalConnector::new(calculator(), ()))
        .await
        .unwrap();

    let missing: Method<(), i64> = Method::new("missing");
    match client.inner().call(&missing, ()).await {
        Err(Error::UnknownOperation(name)) => assert_eq!(name, "missing"),
        other => panic!("expected unknown operation, got {:?}", other),
    }
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_operation_missing_on_server_is_not_found() {
    let client = ExtendedClient::connect(LocalConnector::new(calculator(), ()))
        .await
        .unwrap();

    assert_eq!(client.add(3, 4).await.unwrap(), 7);
    let err = client.square(3).await.unwrap_err();
    assert!(matches!(err, Error::Transport { status: 404, .. }));
    assert_eq!(err.remote_error().unwrap().code, ErrorCode::NotFound);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_result_type_mismatch_is_parse_error() {
    let client = CalculatorClient::connect(LocalConnector::new(calculator(), ()))
        .await
        .unwrap();

    let add_as_text: Method<(i64, i64), String> = Method::new("add");
    assert!(matches!(
        client.inner().call(&add_as_text, (1, 2)).await,
        Err(Error::Parse { .. })
    ));
    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_timeout_bounds_each_call() {
    let connector = LocalConnector::new(calculator(), ()).with_timeout(Duration::from_millis(50));
    let client = CalculatorClient::connect(connector).await.unwrap();

    assert!(matches!(client.slow().await, Err(Error::Timeout(_))));
    assert_eq!(client.add(1, 2).await.unwrap(), 3);
    client.close().await.unwrap();
}
