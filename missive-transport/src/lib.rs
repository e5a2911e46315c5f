pub mod auth;
pub mod framed;
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub mod oauth;
pub mod timeout;
pub mod transport;

pub use auth::{
    AccessToken, AuthenticatedConnector, AuthenticatedTransport, AuthorizedSend, TokenCache,
    TokenLease, TokenSource,
};
pub use framed::{CodecError, FrameCodec, FramedTransport, StreamConnector, TcpConnector};
#[cfg(feature = "http")]
pub use http::{BearerSender, HttpConfig, HttpConnector, HttpSend, HttpTransport, PostEnvelope};
#[cfg(feature = "http")]
pub use oauth::{
    build_assertion, AssertionSigner, ServiceAccountCredentials, ServiceAccountTokenSource,
    JWT_BEARER_GRANT_TYPE,
};
pub use timeout::{Timeout, TimeoutConnector};
pub use transport::{Connector, ConnectorExt, Transport};
