use async_trait::async_trait;
use missive_core::{Call, Error, Operation, Value};
use std::sync::Arc;
use std::time::Duration;

/// An open channel that moves envelopes to a remote endpoint.
///
/// One transport is shared by every call issued through a client, so
/// implementations must tolerate concurrent `send`s (by pooling, or by
/// serializing them internally).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `call` and returns the decoded result value.
    ///
    /// `operation` is the declaration the call was built from; adapters that
    /// map envelopes onto foreign protocols can use it to pick a route.
    async fn send(&self, call: &Call, operation: &Operation) -> Result<Value, Error>;

    /// Releases the channel. Called at most once per transport by the client.
    async fn close(&self) -> Result<(), Error>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, call: &Call, operation: &Operation) -> Result<Value, Error> {
        (**self).send(call, operation).await
    }

    async fn close(&self) -> Result<(), Error> {
        (**self).close().await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(&self, call: &Call, operation: &Operation) -> Result<Value, Error> {
        (**self).send(call, operation).await
    }

    async fn close(&self) -> Result<(), Error> {
        (**self).close().await
    }
}

/// A request to open a [`Transport`]. Consumed by the client factory.
#[async_trait]
pub trait Connector: Send {
    type Transport: Transport + 'static;

    async fn connect(self) -> Result<Self::Transport, Error>;
}

pub trait ConnectorExt: Connector + Sized {
    /// Caps every call made through the opened transport at `budget`.
    fn with_timeout(self, budget: Duration) -> crate::timeout::TimeoutConnector<Self> {
        crate::timeout::TimeoutConnector::new(self, budget)
    }
}

impl<C: Connector> ConnectorExt for C {}
