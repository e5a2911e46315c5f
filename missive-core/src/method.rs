//! Typed handles over [`Operation`]s.
//!
//! A [`Method`] ties an operation name to its argument tuple and result type,
//! so clients build envelopes and servers decode them without either side
//! touching [`Value`]s directly.

use crate::{finite, Call, Error, Operation};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

/// A positional argument list, implemented for tuples of up to six elements.
pub trait Args: Sized + Send + 'static {
    const ARITY: usize;

    fn into_values(self) -> Result<Vec<Value>, Error>;

    fn from_values(values: Vec<Value>) -> Result<Self, Error>;

    fn type_names() -> Vec<&'static str>;
}

fn arity_mismatch(values: &[Value], expected: usize) -> Error {
    Error::parse(
        serde_json::to_vec(values).unwrap_or_default(),
        format!("expected {} arguments, got {}", expected, values.len()),
    )
}

fn encode_arg<T: Serialize>(value: T) -> Result<Value, Error> {
    finite::check(&value)?;
    serde_json::to_value(value).map_err(|e| Error::Codec(e.to_string()))
}

fn decode_arg<T: DeserializeOwned>(value: Value, index: usize) -> Result<T, Error> {
    let raw = serde_json::to_vec(&value).unwrap_or_default();
    serde_json::from_value(value).map_err(|e| Error::parse(raw, format!("argument {}: {}", index, e)))
}

impl Args for () {
    const ARITY: usize = 0;

    fn into_values(self) -> Result<Vec<Value>, Error> {
        Ok(Vec::new())
    }

    fn from_values(values: Vec<Value>) -> Result<Self, Error> {
        if !values.is_empty() {
            return Err(arity_mismatch(&values, 0));
        }
        Ok(())
    }

    fn type_names() -> Vec<&'static str> {
        Vec::new()
    }
}

macro_rules! impl_args {
    ($arity:expr; $($ty:ident => $idx:tt),+) => {
        impl<$($ty),+> Args for ($($ty,)+)
        where
            $($ty: Serialize + DeserializeOwned + Send + 'static,)+
        {
            const ARITY: usize = $arity;

            fn into_values(self) -> Result<Vec<Value>, Error> {
                Ok(vec![$(encode_arg(self.$idx)?),+])
            }

            fn from_values(values: Vec<Value>) -> Result<Self, Error> {
                if values.len() != Self::ARITY {
                    return Err(arity_mismatch(&values, Self::ARITY));
                }
                let mut values = values.into_iter();
                Ok(($(decode_arg::<$ty>(values.next().unwrap_or(Value::Null), $idx)?,)+))
            }

            fn type_names() -> Vec<&'static str> {
                vec![$(type_name::<$ty>()),+]
            }
        }
    };
}

impl_args!(1; A1 => 0);
impl_args!(2; A1 => 0, A2 => 1);
impl_args!(3; A1 => 0, A2 => 1, A3 => 2);
impl_args!(4; A1 => 0, A2 => 1, A3 => 2, A4 => 3);
impl_args!(5; A1 => 0, A2 => 1, A3 => 2, A4 => 3, A5 => 4);
impl_args!(6; A1 => 0, A2 => 1, A3 => 2, A4 => 3, A5 => 4, A6 => 5);

/// Typed handle for one operation taking `A` and returning `R`.
pub struct Method<A, R> {
    name: &'static str,
    _marker: PhantomData<fn(A) -> R>,
}

impl<A, R> Method<A, R> {
    pub const fn new(name: &'static str) -> Self {
        Method {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<A, R> Method<A, R>
where
    A: Args,
    R: Serialize + DeserializeOwned + Send + 'static,
{
    pub fn descriptor(&self) -> Operation {
        Operation::new(self.name, A::type_names(), type_name::<R>())
    }

    /// Packages `args` into an envelope for this operation.
    pub fn envelope(&self, args: A) -> Result<Call, Error> {
        Ok(Call::new(self.name, args.into_values()?))
    }
}

impl<A, R> Clone for Method<A, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A, R> Copy for Method<A, R> {}

impl<A, R> fmt::Debug for Method<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("args", &type_name::<A>())
            .field("returns", &type_name::<R>())
            .finish()
    }
}
