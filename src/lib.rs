//! malrs - a small Lisp-family language processor
//!
//! This crate reads textual source into [`ast::Value`] trees, evaluates them
//! against lexically scoped environments and prints results back to text.
//! Code and data share one representation: lists, vectors and maps produced
//! by the reader are evaluated directly.
//!
//! ```text
//! (def! x 5)                           ; => 5
//! (let* (a 1 b (+ a 1)) b)             ; => 2
//! ((fn* (a & rest) rest) 1 2 3)        ; => (2 3)
//! (if nil "then" "else")               ; => "else"
//! (= (list 1 2) [1 2])                 ; => true
//! ```
//!
//! ## Evaluation model
//!
//! - Only `false` and `nil` are falsy; every other value (including `0`,
//!   `""` and the empty list) is truthy.
//! - `def!`, `let*`, `do`, `if` and `fn*` are special forms, recognised by the
//!   exact text of the head symbol.
//! - Tail positions (`if` branches, the last form of `do`, the body of `let*`
//!   and the body of a called closure) are evaluated by a trampoline loop, so
//!   tail-recursive user functions run in constant native stack space.
//! - Arithmetic is on 64-bit integers and overflow is reported, not wrapped.
//!
//! ## Modules
//!
//! - `reader`: tokenizing and parsing text into values
//! - `printer`: rendering values in readable or display mode
//! - `environment`: chained scopes with shared ownership
//! - `evaluator`: special forms, application and the trampoline loop
//! - `builtinops`: the native builtin table loaded into the root scope
//! - `repl`: interpreter startup sequence and the read-eval-print driver

use thiserror::Error;

/// Maximum nesting depth accepted by the reader.
/// Each nested list, vector or map counts as one level.
pub const MAX_PARSE_DEPTH: usize = 512;

/// Maximum depth of non-tail evaluation.
///
/// Tail calls run in the trampoline loop and do not count against this
/// limit; argument evaluation, `def!` values and `if` conditions do.
pub const MAX_EVAL_DEPTH: usize = 10_000;

/// Grow the native stack if needed before recursing into a nested value or
/// a non-tail evaluation.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    /// Minimum stack space to keep available (100KB red zone).
    const RED_ZONE: usize = 100 * 1024;

    /// Stack space to allocate when growing (1MB).
    const STACK_PER_RECURSION: usize = 1024 * 1024;

    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

/// Categorizes the different kinds of reader errors.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax
    InvalidSyntax,
    /// Input ended before the form was complete (missing closing delimiter)
    Incomplete,
    /// A string literal without its closing quote
    UnterminatedString,
    /// A closing delimiter with no matching opener
    UnbalancedDelimiter,
    /// Odd element count inside `{}` or a key that is not a string or keyword
    MalformedMap,
    /// Nothing to read after discarding whitespace and comments
    Empty,
    /// Nesting exceeded [`MAX_PARSE_DEPTH`]
    TooDeeplyNested,
    /// Implementation-imposed limit exceeded (integer literal out of range)
    ImplementationLimit,
}

/// A structured error describing a reader failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// The offending token, if one could be identified
    pub found: Option<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, found: Option<String>) -> Self {
        ParseError {
            kind,
            message: message.into(),
            found,
        }
    }

    /// Create a ParseError with a kind and message but no offending token
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None)
    }

    /// Create a ParseError naming the token that caused it
    pub fn with_found(kind: ParseErrorKind, message: impl Into<String>, found: &str) -> Self {
        Self::new(kind, message, Some(found.to_owned()))
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(found) = &self.found {
            write!(f, " (found: {found})")?;
        }
        Ok(())
    }
}

/// The three failure families every [`Error`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Raised by the reader
    Syntax,
    /// Raised by the environment: lookup and parameter binding
    Binding,
    /// Raised by the evaluator or a native function
    Evaluation,
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("ParseError: {0}")]
    Parse(ParseError),
    #[error("Unbound symbol: {0}")]
    UnboundSymbol(String),
    #[error("{}", arity_message(.expected, .got, .context))]
    Arity {
        expected: String,
        got: usize,
        context: Option<String>,
    },
    #[error("ArityError: function expected {expected} arguments, got {got}")]
    BindingArity { expected: String, got: usize },
    #[error("Invalid variadic marker position: '&' must be second to last")]
    InvalidVariadicMarker,
    #[error("Invalid binding target: expected a symbol, got {0}")]
    InvalidBindingTarget(String),
    #[error("Type error: {0}")]
    Type(String),
    #[error("EvaluationError: {0}")]
    Eval(String),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Not callable: {0}")]
    NotCallable(String),
    #[error("Unsupported equality: {0}")]
    UnsupportedEquality(String),
    #[error("IOError: {0}")]
    Io(String),
}

fn arity_message(expected: &str, got: &usize, context: &Option<String>) -> String {
    match context {
        Some(ctx) => format!("ArityError: {ctx}: expected {expected} arguments, got {got}"),
        None => format!("ArityError: expected {expected} arguments, got {got}"),
    }
}

impl Error {
    /// Create an ArityError for an exact expected count
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::Arity {
            expected: expected.to_string(),
            got,
            context: None,
        }
    }

    /// Create an ArityError naming the form or function that rejected the call
    pub fn arity_error_in(expected: impl Into<String>, got: usize, context: &str) -> Self {
        Error::Arity {
            expected: expected.into(),
            got,
            context: Some(context.to_owned()),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Parse(_) => ErrorCategory::Syntax,
            Error::UnboundSymbol(_)
            | Error::BindingArity { .. }
            | Error::InvalidVariadicMarker
            | Error::InvalidBindingTarget(_) => ErrorCategory::Binding,
            Error::Arity { .. }
            | Error::Type(_)
            | Error::Eval(_)
            | Error::DivisionByZero
            | Error::NotCallable(_)
            | Error::UnsupportedEquality(_)
            | Error::Io(_) => ErrorCategory::Evaluation,
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Parse(err)
    }
}

pub mod ast;
pub mod builtinops;
pub mod environment;
pub mod evaluator;
pub mod printer;
pub mod reader;
pub mod repl;

pub use ast::Value;
pub use environment::Environment;
pub use evaluator::eval;
pub use printer::pr_str;
pub use reader::read_str;
pub use repl::{Interpreter, InterpreterConfig};
