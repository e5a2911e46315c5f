//! Client side of missive: a generic proxy bound to an interface descriptor,
//! and the [`interface!`] macro that generates typed proxies over it.

pub mod client;
pub mod macros;

pub use client::Client;

#[doc(hidden)]
pub mod __private {
    pub use missive_core::{Error, Interface, Method};
    pub use missive_transport::Connector;
}
