//! Shared vocabulary of the missive RPC stack: the call envelope, interface
//! descriptors, typed method handles, the codec contract and the error model.

pub mod codec;
pub mod envelope;
pub mod error;
mod finite;
pub mod interface;
pub mod method;

pub use codec::{decode_result, from_value, to_value, Codec, JsonCodec};
pub use envelope::{Call, Reply};
pub use error::{ApplicationError, Error, ErrorCode};
pub use interface::{Interface, InterfaceBuilder, Operation};
pub use method::{Args, Method};

pub use serde_json::Value;
