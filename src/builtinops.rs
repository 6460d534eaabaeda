//! Native builtin table.
//!
//! Every entry is a regular function: its arguments are evaluated before the
//! call. Special forms (`def!`, `let*`, `do`, `if`, `fn*`) are not in this
//! table; the evaluator recognises them by the head symbol.
//!
//! ```text
//! (+ 1 2)              ; => 3        binary, overflow is an error
//! (/ 7 2)              ; => 3        truncating, zero divisor is an error
//! (< 1 2)              ; => true     binary, numbers only
//! (count nil)          ; => 0
//! (= [1 2] (list 1 2)) ; => true
//! (pr-str "a" :b)      ; => "\"a\" :b"
//! (str "a" :b)         ; => "a:b"
//! ```
//!
//! ## Adding a builtin
//!
//! 1. Write it as a plain Rust function over typed parameters (`NumberType`,
//!    `&str`, `Value`) or a single `ValueIter` rest parameter.
//! 2. Add a [`BuiltinOp`] entry to `BUILTIN_OPS` with its identifier and
//!    [`Arity`].
//! 3. Cover it in the tests below.

use crate::Error;
use crate::ast::{NumberType, Value};
use crate::evaluator::intooperation::{
    IntoOperation, IntoVariadicOperation, OperationFn, ValueIter,
};
use crate::evaluator::values_equal;
use crate::printer::pr_str;
use crate::reader::read_str;
use std::io::Write;
use std::sync::{Arc, LazyLock};

/// Accepted argument counts of a builtin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    /// Between min and max arguments (inclusive)
    Range(usize, usize),
}

impl Arity {
    /// Check `got` against this arity, naming `context` in the error.
    pub fn validate(&self, got: usize, context: &str) -> Result<(), Error> {
        let ok = match *self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
            Arity::Range(min, max) => (min..=max).contains(&got),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::arity_error_in(self.to_string(), got, context))
        }
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "{min} to {max}"),
        }
    }
}

/// Definition of a builtin operation
#[derive(Clone)]
pub struct BuiltinOp {
    /// The name the operation is bound to in the root scope
    pub id: &'static str,
    /// Expected number of arguments
    pub arity: Arity,
    func: Arc<OperationFn>,
}

impl std::fmt::Debug for BuiltinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinOp")
            .field("id", &self.id)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl BuiltinOp {
    /// Validate the argument count, then run the operation.
    pub fn call(&self, args: Vec<Value>) -> Result<Value, Error> {
        self.arity.validate(args.len(), self.id)?;
        (self.func)(args)
    }

    /// The value bound to [`Self::id`] in the root scope
    pub fn to_value(&'static self) -> Value {
        Value::BuiltinFunction {
            id: self.id.to_owned(),
            func: Arc::new(move |args: Vec<Value>| self.call(args)),
        }
    }
}

//
// Builtin Function Implementations
//

macro_rules! checked_arithmetic {
    ($name:ident, $method:ident, $what:expr) => {
        fn $name(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
            a.$method(b)
                .ok_or_else(|| Error::Eval(concat!("Integer overflow in ", $what).into()))
        }
    };
}

checked_arithmetic!(builtin_add, checked_add, "addition");
checked_arithmetic!(builtin_sub, checked_sub, "subtraction");
checked_arithmetic!(builtin_mul, checked_mul, "multiplication");

fn builtin_div(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    if b == 0 {
        return Err(Error::DivisionByZero);
    }
    a.checked_div(b)
        .ok_or_else(|| Error::Eval("Integer overflow in division".into()))
}

macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(a: NumberType, b: NumberType) -> bool {
            a $op b
        }
    };
}

numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_ge, >=);

fn builtin_list(args: Vec<Value>) -> Value {
    Value::List(args.into())
}

fn builtin_is_list(value: Value) -> bool {
    matches!(value, Value::List(_))
}

fn builtin_is_empty(value: Value) -> Result<bool, Error> {
    match value.as_sequence() {
        Some(items) => Ok(items.is_empty()),
        None => Err(Error::Type(format!(
            "empty? expects a list or vector, got {}",
            value.type_name()
        ))),
    }
}

fn builtin_count(value: Value) -> Result<NumberType, Error> {
    match value {
        Value::Nil => Ok(0),
        Value::List(items) | Value::Vector(items) => NumberType::try_from(items.len())
            .map_err(|_| Error::Eval("count does not fit in a number".into())),
        other => Err(Error::Type(format!(
            "count expects a list, vector or nil, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_equal(a: Value, b: Value) -> Result<bool, Error> {
    values_equal(&a, &b)
}

fn join_printed(args: ValueIter<'_>, readable: bool, separator: &str) -> String {
    args.map(|value| pr_str(value, readable))
        .collect::<Vec<_>>()
        .join(separator)
}

fn builtin_pr_str(args: ValueIter<'_>) -> String {
    join_printed(args, true, " ")
}

fn builtin_str(args: ValueIter<'_>) -> String {
    join_printed(args, false, "")
}

fn write_line(line: &str) -> Result<(), Error> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")
        .and_then(|()| stdout.flush())
        .map_err(|err| Error::Io(format!("stdout: {err}")))
}

fn builtin_prn(args: ValueIter<'_>) -> Result<(), Error> {
    write_line(&join_printed(args, true, " "))
}

fn builtin_println(args: ValueIter<'_>) -> Result<(), Error> {
    write_line(&join_printed(args, false, " "))
}

fn builtin_read_string(source: &str) -> Result<Value, Error> {
    read_str(source)
}

fn builtin_slurp(path: &str) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|err| Error::Io(format!("{path}: {err}")))
}

/// Global registry of all builtin operations, wired through the typed
/// adapter layer once at initialization.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn builtin_fixed<Args, F>(f: F) -> Arc<OperationFn>
    where
        F: IntoOperation<Args>,
    {
        <F as IntoOperation<Args>>::into_operation(f)
    }

    fn builtin_variadic<Args, F>(f: F) -> Arc<OperationFn>
    where
        F: IntoVariadicOperation<Args>,
    {
        <F as IntoVariadicOperation<Args>>::into_variadic_operation(f)
    }

    fn binary_numeric<F>(id: &'static str, f: F) -> BuiltinOp
    where
        F: IntoOperation<(NumberType, NumberType)>,
    {
        BuiltinOp {
            id,
            arity: Arity::Exact(2),
            func: builtin_fixed::<(NumberType, NumberType), _>(f),
        }
    }

    vec![
        // Arithmetic
        binary_numeric("+", builtin_add),
        binary_numeric("-", builtin_sub),
        binary_numeric("*", builtin_mul),
        binary_numeric("/", builtin_div),
        // Comparison
        binary_numeric("<", builtin_lt),
        binary_numeric("<=", builtin_le),
        binary_numeric(">", builtin_gt),
        binary_numeric(">=", builtin_ge),
        BuiltinOp {
            id: "=",
            arity: Arity::Exact(2),
            func: builtin_fixed::<(Value, Value), _>(builtin_equal),
        },
        // Sequences
        BuiltinOp {
            id: "list",
            arity: Arity::AtLeast(0),
            func: builtin_variadic::<(Vec<Value>,), _>(builtin_list),
        },
        BuiltinOp {
            id: "list?",
            arity: Arity::Exact(1),
            func: builtin_fixed::<(Value,), _>(builtin_is_list),
        },
        BuiltinOp {
            id: "empty?",
            arity: Arity::Exact(1),
            func: builtin_fixed::<(Value,), _>(builtin_is_empty),
        },
        BuiltinOp {
            id: "count",
            arity: Arity::Exact(1),
            func: builtin_fixed::<(Value,), _>(builtin_count),
        },
        // Printing
        BuiltinOp {
            id: "pr-str",
            arity: Arity::AtLeast(0),
            func: builtin_variadic::<(ValueIter<'static>,), _>(builtin_pr_str),
        },
        BuiltinOp {
            id: "str",
            arity: Arity::AtLeast(0),
            func: builtin_variadic::<(ValueIter<'static>,), _>(builtin_str),
        },
        BuiltinOp {
            id: "prn",
            arity: Arity::AtLeast(0),
            func: builtin_variadic::<(ValueIter<'static>,), _>(builtin_prn),
        },
        BuiltinOp {
            id: "println",
            arity: Arity::AtLeast(0),
            func: builtin_variadic::<(ValueIter<'static>,), _>(builtin_println),
        },
        // Reading
        BuiltinOp {
            id: "read-string",
            arity: Arity::Exact(1),
            func: builtin_fixed::<(&str,), _>(builtin_read_string),
        },
        BuiltinOp {
            id: "slurp",
            arity: Arity::Exact(1),
            func: builtin_fixed::<(&str,), _>(builtin_slurp),
        },
    ]
});

/// Get all builtin operations
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}
