//! Printer: [`Value`] to text.
//!
//! Readable mode quotes and escapes strings so the output can be read back;
//! display mode writes string contents raw. Printing is total: every value
//! has a rendering.

use std::fmt;

use crate::ast::Value;
use crate::ensure_sufficient_stack;

/// Render `value` as text.
pub fn pr_str(value: &Value, readable: bool) -> String {
    Printed { value, readable }.to_string()
}

/// Display adapter selecting readable or display mode
pub struct Printed<'a> {
    pub value: &'a Value,
    pub readable: bool,
}

impl fmt::Display for Printed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self.value, self.readable)
    }
}

/// Values display in readable mode.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, true)
    }
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &Value, readable: bool) -> fmt::Result {
    match value {
        Value::Number(n) => write!(f, "{n}"),
        Value::Symbol(s) => write!(f, "{s}"),
        Value::String(s) if readable => write_escaped(f, s),
        Value::String(s) => write!(f, "{s}"),
        Value::Keyword(k) => write!(f, ":{k}"),
        Value::Nil => write!(f, "nil"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::List(items) => write_seq(f, "(", items, ")", readable),
        Value::Vector(items) => write_seq(f, "[", items, "]", readable),
        Value::Map(map) => {
            write!(f, "{{")?;
            for (i, (key, val)) in map.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write_value(f, &key.to_value(), readable)?;
                write!(f, " ")?;
                ensure_sufficient_stack(|| write_value(f, val, readable))?;
            }
            write!(f, "}}")
        }
        Value::BuiltinFunction { .. } => write!(f, "#<native-function>"),
        Value::Function { .. } => write!(f, "#<function>"),
    }
}

fn write_seq(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    items: &[Value],
    close: &str,
    readable: bool,
) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        ensure_sufficient_stack(|| write_value(f, item, readable))?;
    }
    write!(f, "{close}")
}

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for ch in s.chars() {
        match ch {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{MapKey, kw, sym, val, vector};
    use crate::environment::Environment;
    use std::rc::Rc;

    #[test]
    fn test_print_data_driven() {
        let map = Value::Map(
            [
                (MapKey::Keyword("b".into()), val(2)),
                (MapKey::String("a".into()), val("x")),
            ]
            .into_iter()
            .collect(),
        );
        let closure = Value::Function {
            params: Rc::from(vec![sym("a")]),
            body: Rc::new(sym("a")),
            env: Environment::new(),
        };

        // (value, readable rendering, display rendering)
        let cases = vec![
            (val(42), "42", "42"),
            (val(-7), "-7", "-7"),
            (sym("foo"), "foo", "foo"),
            (kw("key"), ":key", ":key"),
            (Value::Nil, "nil", "nil"),
            (val(true), "true", "true"),
            (val(false), "false", "false"),
            (val("hi"), "\"hi\"", "hi"),
            (val("a\"b\\c\nd\te\r"), r#""a\"b\\c\nd\te\r""#, "a\"b\\c\nd\te\r"),
            (val(Vec::<Value>::new()), "()", "()"),
            (val(vec![val(1), val("s"), sym("x")]), "(1 \"s\" x)", "(1 s x)"),
            (vector(vec![val(1), val([2, 3])]), "[1 (2 3)]", "[1 (2 3)]"),
            (Value::Map(Default::default()), "{}", "{}"),
            (map, "{\"a\" \"x\" :b 2}", "{a x :b 2}"),
            (closure, "#<function>", "#<function>"),
        ];

        for (i, (value, readable, display)) in cases.iter().enumerate() {
            assert_eq!(pr_str(value, true), *readable, "readable case #{}", i + 1);
            assert_eq!(pr_str(value, false), *display, "display case #{}", i + 1);
        }
    }

    #[test]
    fn test_native_function_is_opaque() {
        let env = crate::evaluator::create_global_env();
        let plus = env.lookup("+").expect("+ is bound");
        assert_eq!(pr_str(&plus, true), "#<native-function>");
        assert_eq!(format!("{plus}"), "#<native-function>");
    }

    #[test]
    fn test_display_is_readable() {
        assert_eq!(format!("{}", val("q\"")), r#""q\"""#);
        assert_eq!(
            format!("{}", Printed { value: &val("q\""), readable: false }),
            "q\""
        );
    }
}
