//! End-to-end behaviour through the public interpreter API.

#![expect(clippy::unwrap_used)] // test code OK

use malrs::{Error, ErrorCategory, Interpreter, InterpreterConfig, Value, pr_str, read_str};
use pretty_assertions::assert_eq;

fn run_all(interp: &Interpreter, cases: &[(&str, &str)]) {
    for (i, (input, expected)) in cases.iter().enumerate() {
        assert_eq!(interp.rep(input), *expected, "case #{} ({input})", i + 1);
    }
}

fn category_of(interp: &Interpreter, input: &str) -> ErrorCategory {
    match interp.eval_str(input) {
        Err(err) => err.category(),
        Ok(value) => panic!("expected an error for {input}, got {value}"),
    }
}

#[test]
fn printed_forms_read_back_unchanged() {
    let sources = [
        "42",
        "-17",
        "+5",
        "sym",
        ":kw",
        "nil",
        "true",
        "false",
        r#""with \"quotes\" and \\ and \n""#,
        "()",
        "(1 (2 [3 4]) \"x\")",
        "[]",
        "[:a [nil true]]",
        "{}",
        r#"{:a 1 "b" (2 3)}"#,
    ];
    for source in sources {
        let once = pr_str(&read_str(source).unwrap(), true);
        let twice = pr_str(&read_str(&once).unwrap(), true);
        assert_eq!(once, twice, "round trip of {source}");
    }
}

#[test]
fn tail_recursion_runs_in_constant_stack() {
    let interp = Interpreter::new();
    run_all(
        &interp,
        &[
            ("(def! down (fn* (n) (if (= n 0) :done (down (- n 1)))))", "#<function>"),
            ("(down 100000)", ":done"),
            (
                "(def! acc (fn* (n total) (if (<= n 0) total (acc (- n 1) (+ total n)))))",
                "#<function>",
            ),
            ("(acc 100000 0)", "5000050000"),
            (
                "(def! through-let (fn* (n) (let* (m (- n 1)) (if (< m 0) nil (do (through-let m))))))",
                "#<function>",
            ),
            ("(through-let 100000)", "nil"),
        ],
    );
}

#[test]
fn deeply_nested_values_print_compare_and_drop() {
    const DEPTH: usize = 100_000;

    let interp = Interpreter::new();
    run_all(
        &interp,
        &[
            ("(def! nest (fn* (n acc) (if (= n 0) acc (nest (- n 1) (list acc)))))", "#<function>"),
            ("(count (def! deep (nest 100000 (list 1))))", "1"),
            ("(= deep (nest 100000 (list 1)))", "true"),
            ("(= deep (nest 100000 (list 2)))", "false"),
        ],
    );

    // One extra level for the innermost `(1)`.
    let printed = interp.rep("deep");
    assert_eq!(printed.len(), 2 * (DEPTH + 1) + 1);
    assert!(printed.starts_with("((((("));
    assert!(printed.ends_with("(1)))))"));
    assert_eq!(printed.matches('(').count(), DEPTH + 1);

    let kept = interp.eval_str("deep").unwrap();
    drop(interp);
    assert!(matches!(kept, Value::List(_)));
    drop(kept);
}

#[test]
fn core_forms() {
    let interp = Interpreter::new();
    run_all(
        &interp,
        &[
            ("(def! x 5)", "5"),
            ("x", "5"),
            ("(let* (a 1 b (+ a 1)) b)", "2"),
            ("(let* [a 1 b a] [a b])", "[1 1]"),
            ("(if false 1)", "nil"),
            ("(if nil 1 2)", "2"),
            ("(if 0 1 2)", "1"),
            ("(if \"\" 1 2)", "1"),
            ("(if (list) 1 2)", "1"),
            ("(do)", "nil"),
            ("(do 1 2 3)", "3"),
            ("((fn* (a & b) b) 1 2 3)", "(2 3)"),
            ("((fn* (a & b) b) 1)", "()"),
            ("((fn* (& all) (count all)))", "0"),
            ("()", "()"),
        ],
    );
}

#[test]
fn structural_equality() {
    let interp = Interpreter::new();
    run_all(
        &interp,
        &[
            ("(= (list 1 2) [1 2])", "true"),
            ("(= [1 2] (list 1 2))", "true"),
            ("(= (list 1 2) (list 1 2 3))", "false"),
            ("(= (list 1 [2 (list 3)]) [1 (list 2 [3])])", "true"),
            ("(= [1 [2 (list 3)]] [1 [2 (list 4)]])", "false"),
            ("(= nil nil)", "true"),
            ("(= true false)", "false"),
            ("(= \"a\" \"a\")", "true"),
            ("(= :a :a)", "true"),
            ("(= 1 2)", "false"),
        ],
    );
    assert!(matches!(
        interp.eval_str("(= {:a 1} {:a 1})"),
        Err(Error::UnsupportedEquality(_))
    ));
    assert!(matches!(
        interp.eval_str("(= 1 \"1\")"),
        Err(Error::UnsupportedEquality(_))
    ));
}

#[test]
fn errors_are_reported_and_recoverable() {
    let interp = Interpreter::new();

    assert_eq!(interp.eval_str("(/ 1 0)"), Err(Error::DivisionByZero));
    assert!(matches!(interp.eval_str("(+ 1 \"a\")"), Err(Error::Type(_))));
    assert_eq!(
        interp.eval_str("(foo 1)"),
        Err(Error::UnboundSymbol("foo".to_owned()))
    );

    assert_eq!(category_of(&interp, "(1 2"), ErrorCategory::Syntax);
    assert_eq!(category_of(&interp, ")"), ErrorCategory::Syntax);
    assert_eq!(category_of(&interp, "\"open"), ErrorCategory::Syntax);
    assert_eq!(category_of(&interp, "{:a}"), ErrorCategory::Syntax);
    assert_eq!(category_of(&interp, "{1 2}"), ErrorCategory::Syntax);
    assert_eq!(category_of(&interp, "  ; nothing"), ErrorCategory::Syntax);
    assert_eq!(category_of(&interp, "undefined"), ErrorCategory::Binding);
    assert_eq!(category_of(&interp, "((fn* (a) a))"), ErrorCategory::Binding);
    assert_eq!(category_of(&interp, "(fn* (a & b c) a)"), ErrorCategory::Binding);
    assert_eq!(category_of(&interp, "(fn* (1) 1)"), ErrorCategory::Binding);
    assert_eq!(category_of(&interp, "(1 2)"), ErrorCategory::Evaluation);
    assert_eq!(category_of(&interp, "(def! 1 2)"), ErrorCategory::Evaluation);
    assert_eq!(category_of(&interp, "(if)"), ErrorCategory::Evaluation);
    assert_eq!(category_of(&interp, "(let* (a) a)"), ErrorCategory::Evaluation);

    // The session is intact after every failure above.
    assert_eq!(interp.rep("(+ 40 2)"), "42");
}

#[test]
fn def_inside_let_stays_in_block_scope() {
    let interp = Interpreter::new();
    run_all(
        &interp,
        &[
            ("(def! x 1)", "1"),
            ("(let* (x 1) (do (def! x 2) x))", "2"),
            ("x", "1"),
            ("(let* (y 10) (do (def! z y) z))", "10"),
            ("z", "Error: Unbound symbol: z"),
        ],
    );
}

#[test]
fn closures_capture_their_scope() {
    let interp = Interpreter::new();
    run_all(
        &interp,
        &[
            ("(def! adder (fn* (n) (fn* (m) (+ n m))))", "#<function>"),
            ("(def! add5 (adder 5))", "#<function>"),
            ("(add5 10)", "15"),
            ("(def! n 100)", "100"),
            ("(add5 1)", "6"),
            ("(def! fib (fn* (n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2))))))", "#<function>"),
            ("(fib 15)", "610"),
        ],
    );
}

#[test]
fn output_builtins() {
    let interp = Interpreter::new();
    run_all(
        &interp,
        &[
            (r#"(pr-str "a" 1 :k)"#, r#""\"a\" 1 :k""#),
            (r#"(str "a" 1 :k)"#, r#""a1:k""#),
            (r#"(read-string "(+ 1 2)")"#, "(+ 1 2)"),
            ("(count nil)", "0"),
            ("(empty? [])", "true"),
            ("(list? (list))", "true"),
            ("(list? [])", "false"),
        ],
    );
}

#[test]
fn prelude_is_optional() {
    let bare = Interpreter::with_config(&InterpreterConfig {
        load_prelude: false,
        prelude: Vec::new(),
    });
    assert!(bare.eval_str("not").is_err());
    assert_eq!(Interpreter::new().eval_str("(not false)").unwrap(), Value::Bool(true));
}
