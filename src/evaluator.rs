use crate::ast::{Value, ValueList, ValueMap};
use crate::builtinops::get_builtin_ops;
use crate::{Error, MAX_EVAL_DEPTH, ensure_sufficient_stack};
use std::rc::Rc;
use tracing::{debug, trace};

pub use crate::environment::Environment;
pub use intooperation::ValueIter;

pub mod intooperation;

/// Special forms, recognised by the exact text of a list's head symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialForm {
    Def,
    Let,
    Do,
    If,
    Fn,
}

impl SpecialForm {
    pub fn from_symbol(name: &str) -> Option<Self> {
        match name {
            "def!" => Some(SpecialForm::Def),
            "let*" => Some(SpecialForm::Let),
            "do" => Some(SpecialForm::Do),
            "if" => Some(SpecialForm::If),
            "fn*" => Some(SpecialForm::Fn),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SpecialForm::Def => "def!",
            SpecialForm::Let => "let*",
            SpecialForm::Do => "do",
            SpecialForm::If => "if",
            SpecialForm::Fn => "fn*",
        }
    }
}

/// Where a special form leaves the evaluation loop
enum Step {
    /// Evaluation is finished with this value
    Done(Value),
    /// Continue the loop with this expression in this scope
    Tail(Value, Environment),
}

/// Evaluate an expression in `env` (public API)
pub fn eval(expr: &Value, env: &Environment) -> Result<Value, Error> {
    eval_with_depth_tracking(expr.clone(), env.clone(), 0)
}

/// Non-tail evaluation of a subexpression, one level deeper.
fn eval_nested(expr: &Value, env: &Environment, depth: usize) -> Result<Value, Error> {
    ensure_sufficient_stack(|| eval_with_depth_tracking(expr.clone(), env.clone(), depth + 1))
}

/// The trampoline. Tail positions reassign `ast`/`env` and loop instead of
/// recursing, so they do not count against [`MAX_EVAL_DEPTH`].
fn eval_with_depth_tracking(
    mut ast: Value,
    mut env: Environment,
    depth: usize,
) -> Result<Value, Error> {
    if depth >= MAX_EVAL_DEPTH {
        return Err(Error::Eval(format!(
            "Evaluation depth limit exceeded (max: {MAX_EVAL_DEPTH})"
        )));
    }

    loop {
        let elements = match ast {
            Value::Symbol(name) => return env.lookup(&name),
            // The empty list evaluates to itself.
            Value::List(elements) if elements.is_empty() => return Ok(Value::List(elements)),
            Value::List(elements) => elements,
            Value::Vector(items) => {
                return Ok(Value::Vector(eval_args(&items, &env, depth)?.into()));
            }
            Value::Map(map) => return eval_map(&map, &env, depth),
            // Self-evaluating forms
            Value::Number(_)
            | Value::String(_)
            | Value::Keyword(_)
            | Value::Nil
            | Value::Bool(_)
            | Value::BuiltinFunction { .. }
            | Value::Function { .. } => return Ok(ast),
        };

        let (head, operands) = match elements.split_first() {
            Some(split) => split,
            None => return Ok(Value::List(ValueList::default())),
        };

        if let Value::Symbol(name) = head
            && let Some(form) = SpecialForm::from_symbol(name)
        {
            let step = match form {
                SpecialForm::Def => eval_def(operands, &env, depth)?,
                SpecialForm::Let => eval_let(operands, &env, depth)?,
                SpecialForm::Do => eval_do(operands, &env, depth)?,
                SpecialForm::If => eval_if(operands, &env, depth)?,
                SpecialForm::Fn => eval_fn(operands, &env)?,
            };
            match step {
                Step::Done(value) => return Ok(value),
                Step::Tail(next_ast, next_env) => {
                    ast = next_ast;
                    env = next_env;
                    continue;
                }
            }
        }

        // Application: evaluate the head and the operands, then apply.
        let callee = eval_nested(head, &env, depth)?;
        let args = eval_args(operands, &env, depth)?;

        match callee {
            Value::BuiltinFunction { func, .. } => return func(args),
            Value::Function {
                params,
                body,
                env: closure_env,
            } => {
                trace!(depth, arity = args.len(), "closure tail call");
                env = Environment::bind_parameters(&closure_env, &params, args)?;
                ast = Value::clone(&body);
            }
            other => {
                return Err(Error::NotCallable(format!(
                    "{} ({})",
                    other,
                    other.type_name()
                )));
            }
        }
    }
}

/// Evaluate each expression left to right, stopping at the first error.
fn eval_args(args: &[Value], env: &Environment, depth: usize) -> Result<Vec<Value>, Error> {
    args.iter().map(|arg| eval_nested(arg, env, depth)).collect()
}

/// Maps evaluate their values; keys are left as they are.
fn eval_map(map: &ValueMap, env: &Environment, depth: usize) -> Result<Value, Error> {
    let evaluated = map
        .iter()
        .map(|(key, expr)| Ok((key.clone(), eval_nested(expr, env, depth)?)))
        .collect::<Result<ValueMap, Error>>()?;
    Ok(Value::Map(evaluated))
}

/// `(def! name expr)`: binds in the current scope and returns the value.
fn eval_def(args: &[Value], env: &Environment, depth: usize) -> Result<Step, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = eval_nested(expr, env, depth)?;
            debug!(%name, kind = value.type_name(), "def!");
            env.define(name.as_str(), value.clone());
            Ok(Step::Done(value))
        }
        [other, _] => Err(Error::Type(format!(
            "def! requires a symbol, got {}",
            other.type_name()
        ))),
        _ => Err(Error::arity_error_in("2", args.len(), "def!")),
    }
}

/// `(let* (name expr ...) body)`: each binding is visible to the next.
fn eval_let(args: &[Value], env: &Environment, depth: usize) -> Result<Step, Error> {
    let [bindings, body] = args else {
        return Err(Error::arity_error_in("2", args.len(), "let*"));
    };
    let Some(bindings) = bindings.as_sequence() else {
        return Err(Error::Type(format!(
            "let* bindings must be a list or vector, got {}",
            bindings.type_name()
        )));
    };
    if bindings.len() % 2 != 0 {
        return Err(Error::Eval(
            "let* bindings must come in name/value pairs".to_owned(),
        ));
    }

    let scope = Environment::with_outer(env);
    for pair in bindings.chunks_exact(2) {
        let [target, expr] = pair else { continue };
        let Value::Symbol(name) = target else {
            return Err(Error::InvalidBindingTarget(format!("{target}")));
        };
        let value = eval_nested(expr, &scope, depth)?;
        scope.define(name.as_str(), value);
    }
    Ok(Step::Tail(body.clone(), scope))
}

/// `(do form ...)`: the last form is in tail position. `(do)` is nil.
fn eval_do(args: &[Value], env: &Environment, depth: usize) -> Result<Step, Error> {
    let Some((last, init)) = args.split_last() else {
        return Ok(Step::Done(Value::Nil));
    };
    for expr in init {
        eval_nested(expr, env, depth)?;
    }
    Ok(Step::Tail(last.clone(), env.clone()))
}

/// `(if cond then [else])`: only `false` and `nil` are falsy.
fn eval_if(args: &[Value], env: &Environment, depth: usize) -> Result<Step, Error> {
    let (condition, then_branch, else_branch) = match args {
        [condition, then_branch] => (condition, then_branch, None),
        [condition, then_branch, else_branch] => (condition, then_branch, Some(else_branch)),
        _ => return Err(Error::arity_error_in("2 or 3", args.len(), "if")),
    };

    let branch = if eval_nested(condition, env, depth)?.is_truthy() {
        then_branch.clone()
    } else {
        else_branch.cloned().unwrap_or(Value::Nil)
    };
    Ok(Step::Tail(branch, env.clone()))
}

/// `(fn* (params) body)`: the parameter list is checked here, not at call time.
fn eval_fn(args: &[Value], env: &Environment) -> Result<Step, Error> {
    match args {
        [Value::List(params), body] => {
            Environment::validate_parameters(params)?;
            Ok(Step::Done(Value::Function {
                params: Rc::from(params.as_slice()),
                body: Rc::new(body.clone()),
                env: env.clone(),
            }))
        }
        [other, _] => Err(Error::Type(format!(
            "fn* parameters must be a list, got {}",
            other.type_name()
        ))),
        _ => Err(Error::arity_error_in("2", args.len(), "fn*")),
    }
}

/// Language-level equality, as used by `=`.
///
/// Numbers, strings and keywords compare by value; `nil`, `true` and `false`
/// by tag. Lists and vectors compare element-wise and are interchangeable.
/// Every other pairing (maps, symbols, functions, mixed kinds) is an error.
pub fn values_equal(a: &Value, b: &Value) -> Result<bool, Error> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Ok(x == y),
        (Value::String(x), Value::String(y)) | (Value::Keyword(x), Value::Keyword(y)) => {
            Ok(x == y)
        }
        (Value::Nil, Value::Nil) => Ok(true),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::Nil | Value::Bool(_), Value::Nil | Value::Bool(_)) => Ok(false),
        _ => match (a.as_sequence(), b.as_sequence()) {
            (Some(xs), Some(ys)) => {
                if xs.len() != ys.len() {
                    return Ok(false);
                }
                for (x, y) in xs.iter().zip(ys) {
                    if !ensure_sufficient_stack(|| values_equal(x, y))? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Err(Error::UnsupportedEquality(format!(
                "cannot compare {} with {}",
                a.type_name(),
                b.type_name()
            ))),
        },
    }
}

/// Create a root environment holding every builtin operation
pub fn create_global_env() -> Environment {
    let env = Environment::new();
    for op in get_builtin_ops() {
        env.define(op.id, op.to_value());
    }
    env
}
