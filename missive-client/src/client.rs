use missive_core::{from_value, Args, Call, Error, Interface, Method, Value};
use missive_transport::{Connector, Transport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace, warn};

/// Generic proxy for one interface over one open transport.
///
/// Calls may be issued concurrently; they all share the transport. The
/// transport is released only by [`Client::close`], never on drop.
pub struct Client {
    interface: Interface,
    transport: Box<dyn Transport>,
    closed: AtomicBool,
}

impl Client {
    /// Opens `connector` and binds it to `interface`.
    pub async fn connect<C: Connector>(interface: Interface, connector: C) -> Result<Self, Error> {
        let transport = connector.connect().await?;
        debug!(
            interface = interface.name(),
            operations = interface.len(),
            "client connected"
        );
        Ok(Self {
            interface,
            transport: Box::new(transport),
            closed: AtomicBool::new(false),
        })
    }

    pub fn interface(&self) -> &Interface {
        &self.interface
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Invokes `method` with `args` and decodes its result.
    pub async fn call<A, R>(&self, method: &Method<A, R>, args: A) -> Result<R, Error>
    where
        A: Args,
        R: Serialize + DeserializeOwned + Send + 'static,
    {
        let value = self.call_raw(method.envelope(args)?).await?;
        from_value(value)
    }

    /// Sends a prebuilt envelope and returns the undecoded result.
    pub async fn call_raw(&self, call: Call) -> Result<Value, Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let operation = self
            .interface
            .operation(call.name())
            .ok_or_else(|| Error::UnknownOperation(call.name().to_string()))?;

        trace!(operation = call.name(), args = call.args().len(), "calling");
        self.transport.send(&call, operation).await
    }

    /// Releases the transport. Later calls fail with [`Error::Closed`];
    /// closing again does nothing.
    pub async fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!(interface = self.interface.name(), "closing client");
        self.transport.close().await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("interface", &self.interface.name())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if !self.is_closed() {
            warn!(
                interface = self.interface.name(),
                "client dropped without close; transport not released"
            );
        }
    }
}
