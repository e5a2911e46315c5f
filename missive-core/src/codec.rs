use crate::{finite, Call, Error};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Converts envelopes and result values to and from bytes.
///
/// Anything satisfying `decode_call(encode_call(c)) == c` works; the rest of
/// the stack only sees [`Call`] and [`Value`].
pub trait Codec: Send + Sync + fmt::Debug + 'static {
    fn content_type(&self) -> &'static str;

    fn encode_call(&self, call: &Call) -> Result<Bytes, Error>;

    fn decode_call(&self, payload: &[u8]) -> Result<Call, Error>;

    fn encode_value(&self, value: &Value) -> Result<Bytes, Error>;

    fn decode_value(&self, payload: &[u8]) -> Result<Value, Error>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode_call(&self, call: &Call) -> Result<Bytes, Error> {
        let json = serde_json::to_vec(call).map_err(|e| Error::Codec(e.to_string()))?;
        Ok(Bytes::from(json))
    }

    fn decode_call(&self, payload: &[u8]) -> Result<Call, Error> {
        serde_json::from_slice(payload)
            .map_err(|e| Error::parse(Bytes::copy_from_slice(payload), e))
    }

    fn encode_value(&self, value: &Value) -> Result<Bytes, Error> {
        let json = serde_json::to_vec(value).map_err(|e| Error::Codec(e.to_string()))?;
        Ok(Bytes::from(json))
    }

    fn decode_value(&self, payload: &[u8]) -> Result<Value, Error> {
        // An empty 2xx body is how unit results come back from some servers.
        if payload.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(payload)
            .map_err(|e| Error::parse(Bytes::copy_from_slice(payload), e))
    }
}

/// Serializes a typed value into the dynamic value model.
///
/// NaN and infinities fail with [`Error::Codec`] rather than becoming `null`.
pub fn to_value<T: Serialize>(value: &T) -> Result<Value, Error> {
    finite::check(value)?;
    serde_json::to_value(value).map_err(|e| Error::Codec(e.to_string()))
}

/// Decodes a dynamic result value into `T`.
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    let payload = serde_json::to_vec(&value).unwrap_or_default();
    serde_json::from_value(value).map_err(|e| Error::parse(payload, e))
}

/// Decodes a raw result payload into `T`.
///
/// Failures keep the raw payload so callers can log what the server sent.
pub fn decode_result<T: DeserializeOwned>(codec: &dyn Codec, payload: Bytes) -> Result<T, Error> {
    let value = codec.decode_value(&payload)?;
    serde_json::from_value(value).map_err(|e| Error::Parse {
        payload,
        reason: e.to_string(),
    })
}
