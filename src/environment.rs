//! Lexical environments.
//!
//! An [`Environment`] is a cheap-to-clone handle to a scope. Scopes are shared
//! between the closures that captured them and the child scopes chained to
//! them, so they are reference counted rather than owned by a single parent.
//! `define` only ever writes to the scope it is given; lookup walks outward.
//!
//! A closure stored into the very scope it captured would make that scope own
//! a reference to itself. Such bindings are kept as [`Slot::OwnClosure`]
//! (parameters and body only) and the scope is re-attached on lookup, so
//! self-recursive definitions do not form reference cycles.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::Error;
use crate::ast::{VARIADIC_MARKER, Value};
use crate::builtinops::Arity;
use crate::evaluator::intooperation::{IntoOperation, IntoVariadicOperation, OperationFn};

#[derive(Debug)]
enum Slot {
    Value(Value),
    OwnClosure { params: Rc<[Value]>, body: Rc<Value> },
}

#[derive(Debug, Default)]
struct Scope {
    bindings: RefCell<HashMap<String, Slot>>,
    outer: Option<Environment>,
}

/// Shared handle to one scope of the environment chain
#[derive(Clone, Default)]
pub struct Environment(Rc<Scope>);

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Bindings may hold closures capturing this scope, so only summarize.
        f.debug_struct("Environment")
            .field("bindings", &self.0.bindings.borrow().len())
            .field("has_outer", &self.0.outer.is_some())
            .finish()
    }
}

/// Scopes are compared by identity.
impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Environment {
    /// Create a new root scope with no bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty child scope of `outer`
    pub fn with_outer(outer: &Environment) -> Self {
        Environment(Rc::new(Scope {
            bindings: RefCell::new(HashMap::new()),
            outer: Some(outer.clone()),
        }))
    }

    /// Insert or overwrite a binding in this scope only.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        let slot = match value {
            Value::Function { params, body, env } if env == *self => {
                Slot::OwnClosure { params, body }
            }
            other => Slot::Value(other),
        };
        self.0.bindings.borrow_mut().insert(name.into(), slot);
    }

    /// Find the innermost scope (possibly this one) that binds `name`.
    pub fn resolve(&self, name: &str) -> Option<Environment> {
        let mut scope = self;
        loop {
            if scope.0.bindings.borrow().contains_key(name) {
                return Some(scope.clone());
            }
            scope = scope.0.outer.as_ref()?;
        }
    }

    /// Look up the value bound to `name`, searching outward.
    pub fn lookup(&self, name: &str) -> Result<Value, Error> {
        let scope = self
            .resolve(name)
            .ok_or_else(|| Error::UnboundSymbol(name.to_owned()))?;
        scope
            .own_value(name)
            .ok_or_else(|| Error::UnboundSymbol(name.to_owned()))
    }

    fn own_value(&self, name: &str) -> Option<Value> {
        let bindings = self.0.bindings.borrow();
        Some(match bindings.get(name)? {
            Slot::Value(value) => value.clone(),
            Slot::OwnClosure { params, body } => Value::Function {
                params: params.clone(),
                body: body.clone(),
                env: self.clone(),
            },
        })
    }

    /// Check a parameter list: every entry must be a symbol, and the
    /// variadic marker `&` may appear once, second to last.
    ///
    /// Returns the number of fixed parameters and whether a rest parameter
    /// follows them.
    pub fn validate_parameters(params: &[Value]) -> Result<(usize, bool), Error> {
        let mut variadic = false;
        for (i, param) in params.iter().enumerate() {
            let Value::Symbol(name) = param else {
                return Err(Error::InvalidBindingTarget(format!("{param}")));
            };
            if name == VARIADIC_MARKER {
                if variadic || i + 2 != params.len() {
                    return Err(Error::InvalidVariadicMarker);
                }
                variadic = true;
            }
        }
        if variadic {
            Ok((params.len() - 2, true))
        } else {
            Ok((params.len(), false))
        }
    }

    /// Build the scope for a closure call: a fresh child of `outer` binding
    /// `params` to `args` positionally.
    ///
    /// The parameter after the variadic marker receives the remaining
    /// arguments as a list (possibly empty).
    pub fn bind_parameters(
        outer: &Environment,
        params: &[Value],
        args: Vec<Value>,
    ) -> Result<Environment, Error> {
        let (fixed, variadic) = Self::validate_parameters(params)?;
        if variadic && args.len() < fixed {
            return Err(Error::BindingArity {
                expected: format!("at least {fixed}"),
                got: args.len(),
            });
        }
        if !variadic && args.len() != fixed {
            return Err(Error::BindingArity {
                expected: fixed.to_string(),
                got: args.len(),
            });
        }

        let mut names = params.iter().filter_map(|param| match param {
            Value::Symbol(name) => Some(name.as_str()),
            _ => None,
        });

        let env = Environment::with_outer(outer);
        let mut args = args.into_iter();
        while let Some(name) = names.next() {
            if name == VARIADIC_MARKER {
                if let Some(rest_name) = names.next() {
                    env.define(rest_name, Value::List(args.by_ref().collect()));
                }
                break;
            }
            if let Some(arg) = args.next() {
                env.define(name, arg);
            }
        }
        Ok(env)
    }

    /// Drop every binding of this scope.
    ///
    /// Used on teardown to release reference cycles that pass through this
    /// scope (for example a closure bound here that captured a child scope).
    pub fn clear(&self) {
        // Move the bindings out first so dropped values never observe a borrowed table.
        let bindings = std::mem::take(&mut *self.0.bindings.borrow_mut());
        drop(bindings);
    }

    /// Register a custom builtin function working on the raw argument vector.
    ///
    /// # Example
    /// ```
    /// use malrs::{Environment, Value, Error};
    ///
    /// fn always_nil(_args: &[Value]) -> Result<Value, Error> {
    ///     Ok(Value::Nil)
    /// }
    ///
    /// let env = malrs::evaluator::create_global_env();
    /// env.register_builtin_function("always-nil", always_nil);
    /// // Now (always-nil 1 2 3) can be called from evaluated expressions
    /// ```
    pub fn register_builtin_function(
        &self,
        name: &str,
        func: fn(&[Value]) -> Result<Value, Error>,
    ) {
        let wrapped: Arc<OperationFn> = Arc::new(move |args: Vec<Value>| func(&args));
        self.define(
            name,
            Value::BuiltinFunction {
                id: name.to_owned(),
                func: wrapped,
            },
        );
    }

    /// Register a strongly-typed Rust function as a builtin using automatic
    /// argument extraction and result conversion.
    ///
    /// Supported parameter types are `i64`, `&str` and `Value`; supported
    /// return types are `Value`, `i64`, `bool`, `String`, `()` (nil) or a
    /// `Result<R, Error>` of anything `Into<Value>`. Arity is enforced
    /// automatically and conversion failures yield `Error::Type`.
    pub fn register_builtin_operation<F, Args>(&self, name: &str, func: F)
    where
        F: IntoOperation<Args>,
    {
        self.define(
            name,
            Value::BuiltinFunction {
                id: name.to_owned(),
                func: func.into_operation(),
            },
        );
    }

    /// Register a builtin receiving all of its arguments through a rest
    /// iterator, validating the argument count against `arity` first.
    pub fn register_variadic_builtin_operation<F, Args>(
        &self,
        name: &str,
        arity: Arity,
        func: F,
    ) where
        F: IntoVariadicOperation<Args>,
    {
        let inner = func.into_variadic_operation();
        let id = name.to_owned();
        let wrapped: Arc<OperationFn> = Arc::new(move |args: Vec<Value>| {
            arity.validate(args.len(), &id)?;
            inner(args)
        });
        self.define(
            name,
            Value::BuiltinFunction {
                id: name.to_owned(),
                func: wrapped,
            },
        );
    }

    /// All bindings visible from this scope, inner ones shadowing outer ones,
    /// sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        if let Some(outer) = &self.0.outer {
            bindings.extend(outer.get_all_bindings());
        }

        let names: Vec<String> = self.0.bindings.borrow().keys().cloned().collect();
        for name in names {
            if let Some(value) = self.own_value(&name) {
                bindings.insert(name, value);
            }
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val};
    use pretty_assertions::assert_eq;

    fn params(names: &[&str]) -> Vec<Value> {
        names.iter().map(sym).collect()
    }

    #[test]
    fn test_define_and_lookup() {
        let env = Environment::new();
        env.define("x", val(5));
        assert_eq!(env.lookup("x").unwrap(), val(5));

        env.define("x", val(6));
        assert_eq!(env.lookup("x").unwrap(), val(6));

        assert_eq!(
            env.lookup("y").unwrap_err(),
            Error::UnboundSymbol("y".to_owned())
        );
    }

    #[test]
    fn test_child_shadows_without_touching_outer() {
        let root = Environment::new();
        root.define("x", val(1));
        let child = Environment::with_outer(&root);

        assert_eq!(child.lookup("x").unwrap(), val(1));
        child.define("x", val(2));
        assert_eq!(child.lookup("x").unwrap(), val(2));
        assert_eq!(root.lookup("x").unwrap(), val(1));
    }

    #[test]
    fn test_resolve_returns_innermost_binding_scope() {
        let root = Environment::new();
        root.define("a", val(1));
        let middle = Environment::with_outer(&root);
        middle.define("b", val(2));
        let inner = Environment::with_outer(&middle);

        assert_eq!(inner.resolve("a"), Some(root.clone()));
        assert_eq!(inner.resolve("b"), Some(middle.clone()));
        assert_eq!(inner.resolve("c"), None);

        inner.define("a", val(3));
        assert_eq!(inner.resolve("a"), Some(inner.clone()));
    }

    #[test]
    fn test_bind_parameters() {
        let root = Environment::new();

        let env = Environment::bind_parameters(&root, &params(&["a", "b"]), vec![val(1), val(2)])
            .unwrap();
        assert_eq!(env.lookup("a").unwrap(), val(1));
        assert_eq!(env.lookup("b").unwrap(), val(2));

        let env = Environment::bind_parameters(
            &root,
            &params(&["a", "&", "rest"]),
            vec![val(1), val(2), val(3)],
        )
        .unwrap();
        assert_eq!(env.lookup("a").unwrap(), val(1));
        assert_eq!(env.lookup("rest").unwrap(), val([2, 3]));
        assert!(env.resolve("&").is_none());

        let env =
            Environment::bind_parameters(&root, &params(&["a", "&", "rest"]), vec![val(1)])
                .unwrap();
        assert_eq!(env.lookup("rest").unwrap(), Value::List(Default::default()));

        let env = Environment::bind_parameters(&root, &params(&["&", "all"]), vec![]).unwrap();
        assert_eq!(env.lookup("all").unwrap(), Value::List(Default::default()));
    }

    #[test]
    fn test_bind_parameters_errors() {
        let root = Environment::new();
        let cases: Vec<(Vec<Value>, Vec<Value>, &str)> = vec![
            (params(&["a", "b"]), vec![val(1)], "ArityError"),
            (params(&["a"]), vec![val(1), val(2)], "ArityError"),
            (params(&["a", "b", "&", "c"]), vec![val(1)], "at least 2"),
            (params(&["&", "a", "b"]), vec![], "variadic marker"),
            (params(&["a", "&"]), vec![val(1)], "variadic marker"),
            (params(&["&", "&"]), vec![], "variadic marker"),
            (vec![sym("a"), val(1)], vec![val(1), val(2)], "binding target"),
        ];

        for (i, (ps, args, expected)) in cases.into_iter().enumerate() {
            let err = Environment::bind_parameters(&root, &ps, args).unwrap_err();
            let msg = format!("{err}");
            assert!(
                msg.contains(expected),
                "case #{}: error should contain '{expected}', got: {msg}",
                i + 1
            );
            assert_eq!(err.category(), crate::ErrorCategory::Binding);
        }
    }

    #[test]
    fn test_self_capturing_closure_does_not_keep_scope_alive() {
        let scope = Environment::new();
        let weak = Rc::downgrade(&scope.0);
        let closure = Value::Function {
            params: Rc::from(params(&["n"])),
            body: Rc::new(sym("n")),
            env: scope.clone(),
        };
        scope.define("f", closure);

        // Lookup re-attaches the scope.
        match scope.lookup("f").unwrap() {
            Value::Function { env, .. } => assert_eq!(env, scope),
            other => panic!("expected function, got {other:?}"),
        }

        drop(scope);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_clear_releases_bindings() {
        let root = Environment::new();
        let child = Environment::with_outer(&root);
        let weak_child = Rc::downgrade(&child.0);
        root.define(
            "g",
            Value::Function {
                params: Rc::from(Vec::new()),
                body: Rc::new(val(1)),
                env: child,
            },
        );
        assert!(weak_child.upgrade().is_some());

        root.clear();
        assert!(weak_child.upgrade().is_none());
        assert!(root.lookup("g").is_err());
    }

    #[test]
    fn test_get_all_bindings_prefers_inner() {
        let root = Environment::new();
        root.define("x", val(1));
        root.define("y", val(2));
        let child = Environment::with_outer(&root);
        child.define("x", val(10));

        assert_eq!(
            child.get_all_bindings(),
            vec![("x".to_owned(), val(10)), ("y".to_owned(), val(2))]
        );
    }
}
