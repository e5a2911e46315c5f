use crate::handler::{erase, BoxedHandler, Handler};
use crate::middleware::{fold_chain, Continuation, Middleware};
use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use missive_core::{Args, Call, Codec, Error, Interface, JsonCodec, Method, Operation, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

struct Binding<Ctx> {
    operation: Operation,
    handler: BoxedHandler<Ctx>,
}

/// Operation name to handler.
struct Registry<Ctx> {
    bindings: IndexMap<String, Binding<Ctx>>,
}

impl<Ctx: Send + 'static> Registry<Ctx> {
    fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    // An interceptor may have renamed the call, so the name is resolved again.
    fn invoke(&self, ctx: Ctx, call: Call) -> BoxFuture<'static, Result<Value, Error>> {
        let (name, args) = call.into_parts();
        match self.bindings.get(&name) {
            Some(binding) => (binding.handler)(ctx, args),
            None => async move { Err(Error::Dispatch(name)) }.boxed(),
        }
    }
}

/// Collects handlers and interceptors for one interface.
///
/// Interceptors run in the order they were added; the first one added is
/// the outermost.
pub struct ServerBuilder<Ctx> {
    interface: Interface,
    bindings: IndexMap<String, Binding<Ctx>>,
    middleware: Vec<Arc<dyn Middleware<Ctx>>>,
    codec: Arc<dyn Codec>,
}

impl<Ctx: Send + 'static> ServerBuilder<Ctx> {
    pub fn new(interface: Interface) -> Self {
        Self {
            interface,
            bindings: IndexMap::new(),
            middleware: Vec::new(),
            codec: Arc::new(JsonCodec),
        }
    }

    pub fn middleware<M: Middleware<Ctx>>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn middleware_arc(mut self, middleware: Arc<dyn Middleware<Ctx>>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Binds `handler` to `method`.
    ///
    /// The handler may take the per-call context as an extra first
    /// parameter. Binding the same operation twice replaces the first
    /// handler.
    pub fn implement<A, R, M, H>(mut self, method: &Method<A, R>, handler: H) -> Self
    where
        A: Args,
        R: Serialize + DeserializeOwned + Send + 'static,
        H: Handler<Ctx, A, R, M>,
    {
        let binding = Binding {
            operation: method.descriptor(),
            handler: erase(handler),
        };
        if self
            .bindings
            .insert(method.name().to_string(), binding)
            .is_some()
        {
            warn!(
                interface = self.interface.name(),
                operation = method.name(),
                "handler registered twice, replacing the earlier one"
            );
        } else {
            debug!(
                interface = self.interface.name(),
                operation = method.name(),
                "registered handler"
            );
        }
        self
    }

    /// Checks every binding against the interface and composes the
    /// interceptor chain.
    pub fn build(self) -> Result<Server<Ctx>, Error> {
        for (name, binding) in &self.bindings {
            let declared = self.interface.operation(name).ok_or_else(|| {
                Error::Registration(format!(
                    "`{}` is not declared by interface `{}`",
                    name,
                    self.interface.name()
                ))
            })?;
            if declared.params() != binding.operation.params()
                || declared.returns() != binding.operation.returns()
            {
                return Err(Error::Registration(format!(
                    "handler for `{}` does not match its declaration `{}`",
                    binding.operation, declared
                )));
            }
        }

        for op in self.interface.operations() {
            if !self.bindings.contains_key(op.name()) {
                debug!(operation = op.name(), "operation has no handler");
            }
        }

        let registry = Arc::new(Registry {
            bindings: self.bindings,
        });

        let chain = if self.middleware.is_empty() {
            None
        } else {
            let terminal_registry = Arc::clone(&registry);
            let terminal: Continuation<Ctx> =
                Arc::new(move |ctx: Ctx, call: Call| terminal_registry.invoke(ctx, call));
            Some(fold_chain(&self.middleware, terminal))
        };

        debug!(
            interface = self.interface.name(),
            handlers = registry.bindings.len(),
            interceptors = self.middleware.len(),
            "server built"
        );

        Ok(Server {
            inner: Arc::new(Inner {
                interface: self.interface,
                registry,
                chain,
                codec: self.codec,
            }),
        })
    }
}

impl<Ctx> fmt::Debug for ServerBuilder<Ctx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("interface", &self.interface.name())
            .field("handlers", &self.bindings.keys().collect::<Vec<_>>())
            .field("interceptors", &self.middleware.len())
            .field("codec", &self.codec)
            .finish()
    }
}

struct Inner<Ctx> {
    interface: Interface,
    registry: Arc<Registry<Ctx>>,
    chain: Option<Continuation<Ctx>>,
    codec: Arc<dyn Codec>,
}

/// Dispatches envelopes to registered handlers. Cheap to clone.
pub struct Server<Ctx = ()> {
    inner: Arc<Inner<Ctx>>,
}

impl<Ctx> Clone for Server<Ctx> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Ctx> fmt::Debug for Server<Ctx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("interface", &self.inner.interface.name())
            .field(
                "handlers",
                &self.inner.registry.bindings.keys().collect::<Vec<_>>(),
            )
            .field("codec", &self.inner.codec)
            .finish()
    }
}

impl<Ctx: Send + 'static> Server<Ctx> {
    pub fn builder(interface: Interface) -> ServerBuilder<Ctx> {
        ServerBuilder::new(interface)
    }

    pub fn interface(&self) -> &Interface {
        &self.inner.interface
    }

    pub fn codec(&self) -> &dyn Codec {
        self.inner.codec.as_ref()
    }

    pub fn is_implemented(&self, operation: &str) -> bool {
        self.inner.registry.contains(operation)
    }

    /// Runs one call through the interceptor chain and its handler.
    ///
    /// Fails with [`Error::Dispatch`] before any interceptor runs when no
    /// handler is registered under the call's name.
    pub async fn process(&self, call: Call, ctx: Ctx) -> Result<Value, Error> {
        if !self.inner.registry.contains(call.name()) {
            warn!(operation = call.name(), "no handler registered");
            return Err(Error::Dispatch(call.name().to_string()));
        }

        trace!(operation = call.name(), args = call.args().len(), "dispatching");
        match &self.inner.chain {
            Some(chain) => chain(ctx, call).await,
            None => self.inner.registry.invoke(ctx, call).await,
        }
    }

    /// Decodes `payload` as an envelope and processes it.
    pub async fn process_payload(&self, payload: &[u8], ctx: Ctx) -> Result<Value, Error> {
        let call = self.inner.codec.decode_call(payload)?;
        self.process(call, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use missive_core::ApplicationError;
    use serde_json::json;

    const ADD: Method<(i64, i64), i64> = Method::new("add");
    const NEGATE: Method<(i64,), i64> = Method::new("negate");
    const UNDECLARED: Method<(), i64> = Method::new("undeclared");

    fn interface() -> Interface {
        Interface::builder("Calculator")
            .operation(ADD.descriptor())
            .and_then(|b| b.operation(NEGATE.descriptor()))
            .unwrap()
            .build()
    }

    async fn add(a: i64, b: i64) -> Result<i64, ApplicationError> {
        Ok(a + b)
    }

    async fn negate(a: i64) -> Result<i64, ApplicationError> {
        Ok(-a)
    }

    async fn undeclared() -> Result<i64, ApplicationError> {
        Ok(0)
    }

    #[tokio::test]
    async fn test_process_calls_handler() {
        let server = Server::<()>::builder(interface())
            .implement(&ADD, add)
            .build()
            .unwrap();
        let result = server
            .process(Call::new("add", vec![json!(1), json!(2)]), ())
            .await;
        assert_eq!(result.unwrap(), json!(3));
    }

    #[tokio::test]
    async fn test_declared_but_unimplemented_is_dispatch_error() {
        let server = Server::<()>::builder(interface())
            .implement(&ADD, add)
            .build()
            .unwrap();
        assert!(server.interface().contains("negate"));
        assert!(!server.is_implemented("negate"));
        assert!(matches!(
            server.process(Call::new("negate", vec![json!(1)]), ()).await,
            Err(Error::Dispatch(name)) if name == "negate"
        ));
    }

    #[test]
    fn test_build_rejects_undeclared_operation() {
        let err = Server::<()>::builder(interface())
            .implement(&UNDECLARED, undeclared)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Registration(_)));
    }

    #[test]
    fn test_build_rejects_signature_mismatch() {
        const WRONG_ADD: Method<(String, String), String> = Method::new("add");

        async fn concat(a: String, b: String) -> Result<String, ApplicationError> {
            Ok(a + &b)
        }

        let err = Server::<()>::builder(interface())
            .implement(&WRONG_ADD, concat)
            .build()
            .unwrap_err();
        match err {
            Error::Registration(reason) => assert!(reason.contains("add(i64, i64) -> i64")),
            other => panic!("expected registration error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_process_payload_rejects_malformed_envelope() {
        let server = Server::<()>::builder(interface())
            .implement(&NEGATE, negate)
            .build()
            .unwrap();
        assert_eq!(
            server
                .process_payload(br#"{"name": "negate", "args": [4]}"#, ())
                .await
                .unwrap(),
            json!(-4)
        );
        assert!(matches!(
            server.process_payload(b"not json", ()).await,
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_builder_debug_lists_handlers() {
        let builder = Server::<()>::builder(interface())
            .implement(&ADD, add)
            .middleware(crate::TracingMiddleware);
        let shown = format!("{:?}", builder);
        assert!(shown.starts_with("ServerBuilder"));
        assert!(shown.contains("\"add\""));
        assert!(shown.contains("interceptors: 1"));
    }
}
