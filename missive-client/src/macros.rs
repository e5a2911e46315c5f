//! Declarative interface definitions.

/// Declares an interface and a typed client proxy for it.
///
/// Every operation becomes a [`Method`](missive_core::Method) handle on the
/// interface type, usable by both sides. The proxy gets one async method
/// per operation, forwarding to a shared [`Client`](crate::Client).
///
/// # Example
///
/// ```rust
/// use missive_client::interface;
///
/// interface! {
///     pub interface Calculator => CalculatorClient {
///         fn add(a: i64, b: i64) -> i64;
///         fn negate(a: i64) -> i64;
///     }
/// }
///
/// let descriptor = Calculator::descriptor().unwrap();
/// assert_eq!(descriptor.len(), 2);
/// assert_eq!(Calculator::add().name(), "add");
/// ```
///
/// Return types are always written out; use `-> ()` for operations with no
/// result.
#[macro_export]
macro_rules! interface {
    (
        $(#[$meta:meta])*
        $vis:vis interface $name:ident => $client:ident {
            $(
                $(#[$op_meta:meta])*
                fn $op:ident($($arg:ident : $ty:ty),* $(,)?) -> $ret:ty;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        $vis struct $name;

        #[allow(dead_code)]
        impl $name {
            $(
                $(#[$op_meta])*
                pub const fn $op() -> $crate::__private::Method<($($ty,)*), $ret> {
                    $crate::__private::Method::new(stringify!($op))
                }
            )*

            /// Descriptor listing every operation in declaration order.
            pub fn descriptor() -> ::std::result::Result<$crate::__private::Interface, $crate::__private::Error> {
                let builder = $crate::__private::Interface::builder(stringify!($name));
                $(
                    let builder = builder.operation($name::$op().descriptor())?;
                )*
                Ok(builder.build())
            }
        }

        #[derive(Debug)]
        $vis struct $client {
            inner: $crate::Client,
        }

        #[allow(dead_code)]
        impl $client {
            pub async fn connect<C>(connector: C) -> ::std::result::Result<Self, $crate::__private::Error>
            where
                C: $crate::__private::Connector,
            {
                let inner = $crate::Client::connect($name::descriptor()?, connector).await?;
                Ok(Self { inner })
            }

            $(
                $(#[$op_meta])*
                pub async fn $op(&self, $($arg: $ty),*) -> ::std::result::Result<$ret, $crate::__private::Error> {
                    self.inner.call(&$name::$op(), ($($arg,)*)).await
                }
            )*

            pub async fn close(&self) -> ::std::result::Result<(), $crate::__private::Error> {
                self.inner.close().await
            }

            pub fn inner(&self) -> &$crate::Client {
                &self.inner
            }
        }
    };
}
