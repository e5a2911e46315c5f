use crate::{Connector, Transport};
use async_trait::async_trait;
use missive_core::{Call, Error, Operation, Value};
use std::time::Duration;
use tracing::warn;

/// Wraps a transport with a total-duration budget per call.
#[derive(Debug)]
pub struct Timeout<T> {
    inner: T,
    budget: Duration,
}

impl<T> Timeout<T> {
    pub fn new(inner: T, budget: Duration) -> Self {
        Timeout { inner, budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[async_trait]
impl<T: Transport> Transport for Timeout<T> {
    async fn send(&self, call: &Call, operation: &Operation) -> Result<Value, Error> {
        match tokio::time::timeout(self.budget, self.inner.send(call, operation)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation = call.name(), budget = ?self.budget, "call timed out");
                Err(Error::Timeout(self.budget))
            }
        }
    }

    async fn close(&self) -> Result<(), Error> {
        self.inner.close().await
    }
}

#[derive(Debug)]
pub struct TimeoutConnector<C> {
    inner: C,
    budget: Duration,
}

impl<C> TimeoutConnector<C> {
    pub fn new(inner: C, budget: Duration) -> Self {
        TimeoutConnector { inner, budget }
    }
}

#[async_trait]
impl<C: Connector> Connector for TimeoutConnector<C> {
    type Transport = Timeout<C::Transport>;

    async fn connect(self) -> Result<Self::Transport, Error> {
        let transport = self.inner.connect().await?;
        Ok(Timeout::new(transport, self.budget))
    }
}
