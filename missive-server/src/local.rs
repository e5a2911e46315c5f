use crate::Server;
use async_trait::async_trait;
use missive_core::{Call, Error, Operation, Value};
use missive_transport::{Connector, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

/// Connects a client straight to an in-process [`Server`].
///
/// Envelopes and results still pass through the server's codec, and
/// failures come back as [`Error::Transport`] with the same status and body
/// the HTTP binding would send.
#[derive(Debug)]
pub struct LocalConnector<Ctx> {
    server: Server<Ctx>,
    ctx: Ctx,
}

impl<Ctx> LocalConnector<Ctx> {
    /// Every call made through the transport sees a clone of `ctx`.
    pub fn new(server: Server<Ctx>, ctx: Ctx) -> Self {
        Self { server, ctx }
    }
}

#[async_trait]
impl<Ctx> Connector for LocalConnector<Ctx>
where
    Ctx: Clone + Send + Sync + 'static,
{
    type Transport = LocalTransport<Ctx>;

    async fn connect(self) -> Result<Self::Transport, Error> {
        Ok(LocalTransport {
            server: self.server,
            ctx: self.ctx,
            closed: AtomicBool::new(false),
        })
    }
}

#[derive(Debug)]
pub struct LocalTransport<Ctx> {
    server: Server<Ctx>,
    ctx: Ctx,
    closed: AtomicBool,
}

#[async_trait]
impl<Ctx> Transport for LocalTransport<Ctx>
where
    Ctx: Clone + Send + Sync + 'static,
{
    async fn send(&self, call: &Call, _operation: &Operation) -> Result<Value, Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }

        let codec = self.server.codec();
        let request = codec.encode_call(call)?;
        trace!(operation = call.name(), bytes = request.len(), "local call");

        match self.server.process_payload(&request, self.ctx.clone()).await {
            Ok(value) => codec.decode_value(&codec.encode_value(&value)?),
            Err(err) => {
                let body = serde_json::to_vec(&err.to_application_error())
                    .map_err(|e| Error::Codec(e.to_string()))?;
                Err(Error::transport(err.status(), body))
            }
        }
    }

    async fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use missive_core::{ApplicationError, Interface, Method};
    use serde_json::json;

    const CALL_ONE: Method<(i64,), i64> = Method::new("call_one");

    async fn call_one(ctx: i64, i: i64) -> Result<i64, ApplicationError> {
        Ok(ctx + i)
    }

    #[tokio::test]
    async fn test_local_round_trip() {
        let interface = Interface::builder("Calculator")
            .operation(CALL_ONE.descriptor())
            .unwrap()
            .build();
        let server = Server::<i64>::builder(interface)
            .implement(&CALL_ONE, call_one)
            .build()
            .unwrap();
        let transport = LocalConnector::new(server, 10).connect().await.unwrap();
        let op = CALL_ONE.descriptor();

        let call = CALL_ONE.envelope((1,)).unwrap();
        assert_eq!(transport.send(&call, &op).await.unwrap(), json!(11));

        let bad = Call::new("call_one", vec![json!("x")]);
        match transport.send(&bad, &op).await {
            Err(err @ Error::Transport { status: 400, .. }) => {
                assert!(err.remote_error().is_some());
            }
            other => panic!("expected 400, got {:?}", other),
        }

        transport.close().await.unwrap();
        assert!(matches!(transport.send(&call, &op).await, Err(Error::Closed)));
    }
}
