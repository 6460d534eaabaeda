use crate::Error;
use crate::ast::{NumberType, Value};
use std::iter::FusedIterator;
use std::sync::Arc;

// Adapter layer between plain Rust functions and the erased `OperationFn`
// stored in `Value::BuiltinFunction`. Builtins are written against typed
// parameters (`i64`, `&str`, `Value`, `ValueIter`, `Vec<Value>`) and this module performs
// the argument count check and the conversions.

/// Erased native function type.
///
/// Natives receive ownership of their argument vector. The `Send + Sync`
/// bound lets the builtin table live in a process-wide static.
pub type OperationFn = dyn Fn(Vec<Value>) -> Result<Value, Error> + Send + Sync;

/// Converts one evaluated argument into a typed parameter.
///
/// `Param<'a>` may borrow from the argument slot (`&str`) or take it by
/// value (`Value`, `i64`).
pub trait FromParam {
    type Param<'a>;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error>;
}

impl FromParam for Value {
    type Param<'a> = Value;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        Ok(std::mem::replace(value, Value::Nil))
    }
}

// By-value primitives reachable through `impl TryInto<T> for Value` in `ast.rs`.
impl<T> FromParam for T
where
    Value: std::convert::TryInto<T, Error = Error>,
{
    type Param<'a> = T;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        let owned = std::mem::replace(value, Value::Nil);
        <Value as std::convert::TryInto<T>>::try_into(owned)
    }
}

impl FromParam for &str {
    type Param<'a> = &'a str;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        if let Value::String(s) = value {
            Ok(s.as_str())
        } else {
            Err(Error::Type(format!(
                "expected string, got {}",
                value.type_name()
            )))
        }
    }
}

/// Borrowed iterator over the rest arguments of a variadic native.
pub struct ValueIter<'a> {
    inner: std::slice::Iter<'a, Value>,
}

impl<'a> ValueIter<'a> {
    pub(crate) fn new(values: &'a [Value]) -> Self {
        ValueIter {
            inner: values.iter(),
        }
    }
}

impl<'a> Iterator for ValueIter<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for ValueIter<'_> {}
impl FusedIterator for ValueIter<'_> {}

/// Builds the rest parameter of a variadic native from its arguments.
pub trait FromRest {
    type Param<'a>;

    fn from_rest<'a>(args: &'a mut Vec<Value>) -> Result<Self::Param<'a>, Error>;
}

impl FromRest for ValueIter<'static> {
    type Param<'a> = ValueIter<'a>;

    fn from_rest<'a>(args: &'a mut Vec<Value>) -> Result<Self::Param<'a>, Error> {
        Ok(ValueIter::new(args))
    }
}

// The native takes ownership of the whole argument vector.
impl FromRest for Vec<Value> {
    type Param<'a> = Vec<Value>;

    fn from_rest<'a>(args: &'a mut Vec<Value>) -> Result<Self::Param<'a>, Error> {
        Ok(std::mem::take(args))
    }
}

/// Normalizes native return types to `Result<Value, Error>`.
pub trait IntoValueResult {
    fn into_value_result(self) -> Result<Value, Error>;
}

impl<T> IntoValueResult for Result<T, Error>
where
    T: Into<Value>,
{
    fn into_value_result(self) -> Result<Value, Error> {
        self.map(Into::into)
    }
}

macro_rules! impl_into_value_result {
    ($( $t:ty ),+) => {
        $(
            impl IntoValueResult for $t {
                fn into_value_result(self) -> Result<Value, Error> {
                    Ok(self.into())
                }
            }
        )+
    };
}

impl_into_value_result!(Value, NumberType, bool, String, ());

/// Turns a fixed-arity typed function into an [`OperationFn`].
pub trait IntoOperation<Args> {
    fn into_operation(self) -> Arc<OperationFn>;
}

/// Turns a function taking only a rest parameter into an [`OperationFn`].
pub trait IntoVariadicOperation<Args> {
    fn into_variadic_operation(self) -> Arc<OperationFn>;
}

impl<F, I, R> IntoVariadicOperation<(I,)> for F
where
    I: FromRest,
    F: for<'a> Fn(<I as FromRest>::Param<'a>) -> R + Send + Sync + 'static,
    R: IntoValueResult,
{
    fn into_variadic_operation(self) -> Arc<OperationFn> {
        Arc::new(move |mut args: Vec<Value>| {
            let rest_param: <I as FromRest>::Param<'_> = <I as FromRest>::from_rest(&mut args)?;
            let result: R = (self)(rest_param);
            result.into_value_result()
        })
    }
}

/// Implements `IntoOperation` for one arity. The argument vector is
/// destructured into local slots so each `FromParam` conversion can borrow
/// from or consume its own argument.
macro_rules! impl_into_operation_for_arity {
    ($arity:expr, $( $v:ident, $p:ident : $A:ident ),+ ) => {
        impl<F, R, $( $A ),+> IntoOperation<( $( $A, )+ )> for F
        where
            F: for<'a> Fn( $( <$A as FromParam>::Param<'a> ),+ ) -> R
                + Send
                + Sync
                + 'static,
            $( $A: FromParam, )+
            R: IntoValueResult,
        {
            fn into_operation(self) -> Arc<OperationFn> {
                Arc::new(move |mut args: Vec<Value>| {
                    let len = args.len();
                    match args.as_mut_slice() {
                        &mut [ $( ref mut $v ),+ ] => {
                            $(
                                let $p: <$A as FromParam>::Param<'_> =
                                    <$A as FromParam>::from_arg($v)?;
                            )+

                            let result: R = (self)( $( $p ),+ );
                            result.into_value_result()
                        }
                        _ => Err(Error::arity_error($arity, len)),
                    }
                })
            }
        }
    };
}

impl_into_operation_for_arity!(1, v0, p0: A1);
impl_into_operation_for_arity!(2, v0, p0: A1, v1, p1: A2);
