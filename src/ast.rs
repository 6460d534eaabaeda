//! This module defines the runtime value model shared by the reader, the
//! evaluator and the printer. The reader produces [`Value`] trees and the
//! evaluator consumes the very same trees as code, so there is no separate
//! syntax tree type. Ergonomic helper functions such as [`val`], [`sym`] and
//! [`kw`] are provided for convenient construction in tests, along with
//! conversion traits for common Rust types.
//!
//! Equality here (`PartialEq`) is strict Rust-level structural equality used
//! by tests and internal bookkeeping: a List never equals a Vector. The
//! language-level `=` lives in [`crate::evaluator::values_equal`] and follows
//! the language's own rules.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::rc::Rc;
use std::sync::Arc;

use crate::Error;
use crate::environment::Environment;
use crate::evaluator::intooperation::OperationFn;

/// Type alias for number values in the interpreter
pub type NumberType = i64;

/// Symbol that marks the rest parameter in a `fn*` parameter list
pub const VARIADIC_MARKER: &str = "&";

/// Key of a [`Value::Map`]. Only strings and keywords may be map keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    String(String),
    Keyword(String),
}

impl MapKey {
    pub fn to_value(&self) -> Value {
        match self {
            MapKey::String(s) => Value::String(s.clone()),
            MapKey::Keyword(k) => Value::Keyword(k.clone()),
        }
    }
}

impl TryFrom<Value> for MapKey {
    type Error = Value;

    /// Hands the value back when it cannot be used as a key.
    fn try_from(value: Value) -> Result<Self, Value> {
        match value {
            Value::String(s) => Ok(MapKey::String(s)),
            Value::Keyword(k) => Ok(MapKey::Keyword(k)),
            other => Err(other),
        }
    }
}

/// Contents of a list or vector
pub type ValueList = Shared<Vec<Value>>;

/// Contents of a map
pub type ValueMap = Shared<BTreeMap<MapKey, Value>>;

/// Collection storage that can hand its nested collections to a teardown
/// stack.
pub trait Contents {
    /// Move every nested list, vector or map out of `self` onto `pending`.
    fn take_nested(&mut self, pending: &mut Vec<Value>);
}

impl Contents for Vec<Value> {
    fn take_nested(&mut self, pending: &mut Vec<Value>) {
        for item in self.iter_mut().filter(|item| item.is_collection()) {
            pending.push(std::mem::replace(item, Value::Nil));
        }
    }
}

impl Contents for BTreeMap<MapKey, Value> {
    fn take_nested(&mut self, pending: &mut Vec<Value>) {
        for item in self.values_mut().filter(|item| item.is_collection()) {
            pending.push(std::mem::replace(item, Value::Nil));
        }
    }
}

/// Immutable, reference-counted collection contents.
///
/// Cloning shares the contents. Dropping the last handle to an arbitrarily
/// deep value runs in constant native stack: nested collections are
/// detached onto an explicit stack and released one level at a time.
pub struct Shared<T: Contents>(Rc<T>);

impl<T: Contents> Shared<T> {
    pub fn new(contents: T) -> Self {
        Shared(Rc::new(contents))
    }

    fn release_nested(&mut self, pending: &mut Vec<Value>) {
        if let Some(contents) = Rc::get_mut(&mut self.0) {
            contents.take_nested(pending);
        }
    }
}

impl<T: Contents> Drop for Shared<T> {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.release_nested(&mut pending);
        while let Some(mut value) = pending.pop() {
            value.release_nested(&mut pending);
        }
    }
}

impl<T: Contents> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared(Rc::clone(&self.0))
    }
}

impl<T: Contents> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Contents + PartialEq> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
    }
}

impl<T: Contents + Default> Default for Shared<T> {
    fn default() -> Self {
        Shared::new(T::default())
    }
}

impl<T: Contents> From<T> for Shared<T> {
    fn from(contents: T) -> Self {
        Shared::new(contents)
    }
}

impl FromIterator<Value> for ValueList {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Shared::new(iter.into_iter().collect())
    }
}

impl FromIterator<(MapKey, Value)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (MapKey, Value)>>(iter: I) -> Self {
        Shared::new(iter.into_iter().collect())
    }
}

/// Core value type of the interpreter
///
/// To build values in tests, use the helper functions:
/// - `val(42)` for values, `sym("name")` for symbols, `kw("name")` for keywords
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Clone)]
pub enum Value {
    /// Numbers (64-bit integers only)
    Number(NumberType),
    /// Symbols (identifiers), looked up when evaluated
    Symbol(String),
    /// String literals
    String(String),
    /// Keywords, printed with a leading `:`
    Keyword(String),
    /// The `nil` literal
    Nil,
    /// The `true` and `false` literals
    Bool(bool),
    /// Lists; evaluated as special forms or applications
    List(ValueList),
    /// Vectors; evaluate to a vector of their evaluated elements
    Vector(ValueList),
    /// Maps keyed by strings or keywords; evaluation evaluates the values only
    Map(ValueMap),
    /// Native functions from the builtin table (or registered by the host).
    /// Uses the id string for equality comparison instead of the function pointer.
    BuiltinFunction {
        id: String,
        // Stored as an Arc to allow dynamic wrapping of typed Rust functions/closures.
        func: Arc<OperationFn>,
    },
    /// User-defined functions created by `fn*`
    Function {
        /// Validated parameter symbols, possibly containing the variadic marker
        params: Rc<[Value]>,
        body: Rc<Value>,
        env: Environment,
    },
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::String(s) => write!(f, "String(\"{s}\")"),
            Value::Keyword(k) => write!(f, "Keyword({k})"),
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::List(list) => write_debug_seq(f, "List", list),
            Value::Vector(items) => write_debug_seq(f, "Vector", items),
            Value::Map(map) => {
                write!(f, "Map(")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?} => {v:?}", k.to_value())?;
                }
                write!(f, ")")
            }
            Value::BuiltinFunction { id, .. } => write!(f, "BuiltinFunction({id})"),
            // The captured environment is left out: it may contain this very function.
            Value::Function { params, body, .. } => {
                write!(f, "Function(params={params:?}, body={body:?})")
            }
        }
    }
}

fn write_debug_seq(
    f: &mut std::fmt::Formatter<'_>,
    name: &str,
    items: &[Value],
) -> std::fmt::Result {
    write!(f, "{name}(")?;
    for (i, v) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{v:?}")?;
    }
    write!(f, ")")
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Nil
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(n as NumberType)
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(Into::into).collect())
    }
}

// Fallible conversions from `Value` back into primitive Rust types.

impl std::convert::TryInto<NumberType> for Value {
    type Error = Error;

    fn try_into(self) -> Result<NumberType, Error> {
        if let Value::Number(n) = self {
            Ok(n)
        } else {
            Err(Error::Type(format!("expected number, got {}", self.type_name())))
        }
    }
}

/// Helper function for creating symbols
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating keywords (without the leading `:`)
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn kw<S: AsRef<str>>(name: S) -> Value {
    Value::Keyword(name.as_ref().to_owned())
}

/// Helper function for creating Values from anything convertible
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating vectors
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn vector<T: Into<Value>>(items: Vec<T>) -> Value {
    Value::Vector(items.into_iter().map(Into::into).collect())
}

impl Value {
    /// Lists, vectors and maps
    pub fn is_collection(&self) -> bool {
        matches!(self, Value::List(_) | Value::Vector(_) | Value::Map(_))
    }

    fn release_nested(&mut self, pending: &mut Vec<Value>) {
        match self {
            Value::List(items) | Value::Vector(items) => items.release_nested(pending),
            Value::Map(map) => map.release_nested(pending),
            _ => {}
        }
    }

    /// Only the `false` and `nil` literals are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// The ordered-sequence view shared by lists and vectors
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Vector(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Short kind name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Symbol(_) => "symbol",
            Value::String(_) => "string",
            Value::Keyword(_) => "keyword",
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::List(_) => "list",
            Value::Vector(_) => "vector",
            Value::Map(_) => "map",
            Value::BuiltinFunction { .. } => "builtin function",
            Value::Function { .. } => "function",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Keyword(a), Value::Keyword(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::BuiltinFunction { id: id1, .. }, Value::BuiltinFunction { id: id2, .. }) => {
                id1 == id2
            }
            (
                Value::Function {
                    params: p1,
                    body: b1,
                    env: e1,
                },
                Value::Function {
                    params: p2,
                    body: b2,
                    env: e2,
                },
            ) => p1 == p2 && b1 == b2 && e1 == e2,
            _ => false,
        }
    }
}
