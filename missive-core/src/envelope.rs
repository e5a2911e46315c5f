use crate::Error;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One remote invocation: an operation name plus its positional arguments.
///
/// Envelopes are values. Interceptors that want to change a call build a new
/// one with [`Call::with_args`] instead of mutating the one they were given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    name: String,
    #[serde(default)]
    args: Vec<Value>,
}

impl Call {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Call {
            name: name.into(),
            args,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// The same operation with a replaced argument list.
    pub fn with_args(self, args: Vec<Value>) -> Self {
        Call {
            name: self.name,
            args,
        }
    }

    /// Decodes the argument at `index` as `T`.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, Error> {
        let value = self.args.get(index).ok_or_else(|| {
            Error::parse(
                serde_json::to_vec(&self.args).unwrap_or_default(),
                format!("`{}` has no argument at position {}", self.name, index),
            )
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            Error::parse(
                serde_json::to_vec(value).unwrap_or_default(),
                format!("argument {} of `{}`: {}", index, self.name, e),
            )
        })
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.name, self.args)
    }
}

/// A reply frame for bindings that cannot signal failure out of band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    Ok(Value),
    Err { status: u16, body: Value },
}

impl Reply {
    pub fn from_result(result: Result<Value, Error>) -> Self {
        match result {
            Ok(value) => Reply::Ok(value),
            Err(err) => Reply::Err {
                status: err.status(),
                body: serde_json::to_value(err.to_application_error()).unwrap_or(Value::Null),
            },
        }
    }

    /// Turns an error reply into the [`Error::Transport`] a caller sees.
    pub fn into_result(self) -> Result<Value, Error> {
        match self {
            Reply::Ok(value) => Ok(value),
            Reply::Err { status, body } => Err(Error::transport(
                status,
                serde_json::to_vec(&body).unwrap_or_default(),
            )),
        }
    }
}
