use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    NotFound,
    PermissionDenied,
    ResourceExhausted,
    Canceled,
    Internal,
}

impl ErrorCode {
    /// HTTP-style status used when the code crosses a binding.
    pub fn status(&self) -> u16 {
        match self {
            ErrorCode::BadRequest => 400,
            ErrorCode::NotFound => 404,
            ErrorCode::PermissionDenied => 403,
            ErrorCode::ResourceExhausted => 429,
            ErrorCode::Canceled => 499,
            ErrorCode::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::NotFound => "not_found",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::ResourceExhausted => "resource_exhausted",
            ErrorCode::Canceled => "canceled",
            ErrorCode::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}

/// A failure produced on purpose by a handler or interceptor.
///
/// The framework never inspects it; it travels back to the caller as the
/// body of a non-success reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ApplicationError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApplicationError {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: ErrorCode, message: impl Into<String>, data: Value) -> Self {
        ApplicationError {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceExhausted, message)
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Canceled, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApplicationError {}

/// Every way a call can fail, on either side of the wire.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The endpoint was reached but answered with a non-success status.
    #[error("transport error: status {status}")]
    Transport { status: u16, body: Bytes },
    /// A payload did not match the schema it was decoded against.
    #[error("parse error: {reason}")]
    Parse { payload: Bytes, reason: String },
    /// No handler is registered under the envelope's operation name.
    #[error("no handler registered for operation `{0}`")]
    Dispatch(String),
    #[error(transparent)]
    Application(#[from] ApplicationError),
    /// The request never reached the endpoint.
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    #[error("client is closed")]
    Closed,
    #[error("operation `{0}` is not declared by the interface")]
    UnknownOperation(String),
    #[error("registration error: {0}")]
    Registration(String),
    #[error("codec error: {0}")]
    Codec(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn transport(status: u16, body: impl Into<Bytes>) -> Self {
        Error::Transport {
            status,
            body: body.into(),
        }
    }

    pub fn parse(payload: impl Into<Bytes>, reason: impl fmt::Display) -> Self {
        Error::Parse {
            payload: payload.into(),
            reason: reason.to_string(),
        }
    }

    /// HTTP-style status for this error when it is sent back over a binding.
    pub fn status(&self) -> u16 {
        match self {
            Error::Transport { status, .. } => *status,
            Error::Parse { .. } => 400,
            Error::Dispatch(_) | Error::UnknownOperation(_) => 404,
            Error::Application(err) => err.code.status(),
            Error::Unreachable(_) => 502,
            Error::Closed => 503,
            Error::Timeout(_) => 504,
            Error::Registration(_) | Error::Codec(_) | Error::Config(_) => 500,
        }
    }

    /// True when the remote side rejected the caller's credentials.
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Error::Transport { status: 401, .. })
    }

    /// The error as it is reported to a remote caller.
    pub fn to_application_error(&self) -> ApplicationError {
        match self {
            Error::Application(err) => err.clone(),
            Error::Parse { .. } => ApplicationError::bad_request(self.to_string()),
            Error::Dispatch(_) | Error::UnknownOperation(_) => {
                ApplicationError::not_found(self.to_string())
            }
            _ => ApplicationError::internal(self.to_string()),
        }
    }

    /// Decodes the body of a [`Error::Transport`] as the [`ApplicationError`]
    /// a missive server sends with non-success replies.
    pub fn remote_error(&self) -> Option<ApplicationError> {
        match self {
            Error::Transport { body, .. } => serde_json::from_slice(body).ok(),
            _ => None,
        }
    }
}
