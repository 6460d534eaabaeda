//! Interpreter startup and the read-eval-print driver.
//!
//! The line editor is abstracted as a [`LineSource`]; the binary plugs in a
//! rustyline editor, tests and piped input use any buffered reader.

use std::io::{self, BufRead, Write};

use tracing::{debug, warn};

use crate::Error;
use crate::ast::Value;
use crate::environment::Environment;
use crate::evaluator::{create_global_env, eval};
use crate::printer::pr_str;
use crate::reader::read_str;

/// Definitions evaluated into the root scope before any user input
pub const STANDARD_PRELUDE: &[&str] = &["(def! not (fn* (a) (if a false true)))"];

/// Interpreter startup options
#[derive(Debug, Clone, PartialEq)]
pub struct InterpreterConfig {
    /// Evaluate `prelude` at startup
    pub load_prelude: bool,
    /// Program texts evaluated, in order, after the builtins are bound
    pub prelude: Vec<String>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            load_prelude: true,
            prelude: STANDARD_PRELUDE.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

/// A root environment with the builtins and prelude loaded.
pub struct Interpreter {
    env: Environment,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Create an interpreter with the standard prelude
    pub fn new() -> Self {
        Self::with_config(&InterpreterConfig::default())
    }

    /// Create an interpreter from `config`.
    ///
    /// Prelude failures are logged and discarded; they never abort startup.
    pub fn with_config(config: &InterpreterConfig) -> Self {
        let env = create_global_env();
        debug!(bindings = env.get_all_bindings().len(), "root environment ready");

        if config.load_prelude {
            for source in &config.prelude {
                match read_str(source).and_then(|ast| eval(&ast, &env)) {
                    Ok(value) => debug!(%source, result = %value, "prelude form loaded"),
                    Err(err) => warn!(%source, error = %err, "prelude form failed"),
                }
            }
        }

        Interpreter { env }
    }

    /// The root scope
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Read and evaluate the first form of `line` in the root scope.
    pub fn eval_str(&self, line: &str) -> Result<Value, Error> {
        let ast = read_str(line)?;
        eval(&ast, &self.env)
    }

    /// One read-eval-print cycle: the readable rendering of the result, or
    /// a description of the error.
    pub fn rep(&self, line: &str) -> String {
        match self.eval_str(line) {
            Ok(value) => pr_str(&value, true),
            Err(err) => format!("Error: {err}"),
        }
    }
}

/// Closures stored in the root scope may capture scopes that point back at
/// the root; clearing the bindings releases them.
impl Drop for Interpreter {
    fn drop(&mut self) {
        self.env.clear();
    }
}

/// Blocking source of input lines
pub trait LineSource {
    /// The next line without its terminator, or `None` at end of input.
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;
}

/// Lines from any buffered reader (piped stdin, files, in-memory text).
/// No prompt is shown.
impl<B: BufRead> LineSource for io::Lines<B> {
    fn read_line(&mut self, _prompt: &str) -> io::Result<Option<String>> {
        self.next().transpose()
    }
}

/// Run the loop until `source` is exhausted, writing one line to `out` per
/// non-blank input line. Evaluation errors are printed, not returned; only
/// I/O failures end the loop early.
pub fn run<S, W>(
    interpreter: &Interpreter,
    source: &mut S,
    out: &mut W,
    prompt: &str,
) -> io::Result<()>
where
    S: LineSource + ?Sized,
    W: Write + ?Sized,
{
    while let Some(line) = source.read_line(prompt)? {
        if line.trim().is_empty() {
            continue;
        }
        writeln!(out, "{}", interpreter.rep(&line))?;
        out.flush()?;
    }
    Ok(())
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;
    use pretty_assertions::assert_eq;

    fn lines(input: &[&str]) -> io::Lines<io::Cursor<String>> {
        io::Cursor::new(input.join("\n")).lines()
    }

    #[test]
    fn test_rep_outputs() {
        let interp = Interpreter::new();
        let cases = vec![
            ("(+ 1 2)", "3"),
            ("\"a\\nb\"", "\"a\\nb\""),
            ("(def! x 5)", "5"),
            ("x", "5"),
            ("(list 1 \"s\" :k nil true)", "(1 \"s\" :k nil true)"),
            ("[1 (+ 1 1)]", "[1 2]"),
            ("{:a (+ 1 1)}", "{:a 2}"),
            ("(fn* (a) a)", "#<function>"),
            ("+", "#<native-function>"),
            ("(not true)", "false"),
            ("(not nil)", "true"),
            ("(/ 1 0)", "Error: Division by zero"),
            ("(foo 1)", "Error: Unbound symbol: foo"),
            ("(", "Error: ParseError: Unexpected end of input, expected ')'"),
            ("1 2 3", "1"),
        ];
        for (i, (input, expected)) in cases.into_iter().enumerate() {
            assert_eq!(interp.rep(input), expected, "rep case #{} ({input})", i + 1);
        }
    }

    #[test]
    fn test_prelude_configuration() {
        let without = Interpreter::with_config(&InterpreterConfig {
            load_prelude: false,
            ..InterpreterConfig::default()
        });
        assert_eq!(without.rep("(not true)"), "Error: Unbound symbol: not");

        // Failing prelude forms are swallowed; later ones still load.
        let custom = Interpreter::with_config(&InterpreterConfig {
            load_prelude: true,
            prelude: vec![
                "(def! broken (/ 1 0))".to_owned(),
                "(unbalanced".to_owned(),
                "(def! inc (fn* (n) (+ n 1)))".to_owned(),
            ],
        });
        assert_eq!(custom.eval_str("(inc 41)").unwrap(), val(42));
        assert!(custom.eval_str("broken").is_err());
        assert!(custom.eval_str("not").is_err());
    }

    #[test]
    fn test_run_writes_one_line_per_input() {
        let interp = Interpreter::new();
        let mut source = lines(&[
            "(def! sq (fn* (n) (* n n)))",
            "",
            "   ",
            "(sq 7)",
            "(sq)",
            "; just a comment",
            "(sq 3)",
        ]);
        let mut out = Vec::new();
        run(&interp, &mut source, &mut out, "user> ").unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "#<function>\n\
             49\n\
             Error: ArityError: function expected 1 arguments, got 0\n\
             Error: ParseError: Empty input\n\
             9\n"
        );
    }

    #[test]
    fn test_drop_releases_root_cycles() {
        let interp = Interpreter::new();
        interp
            .eval_str("(def! make (fn* () (let* (inner (fn* () make)) inner)))")
            .unwrap();
        interp.eval_str("(def! kept (make))").unwrap();
        let captured = match interp.eval_str("kept").unwrap() {
            Value::Function { env, .. } => env,
            other => panic!("expected closure, got {other:?}"),
        };
        assert!(captured.lookup("inner").is_ok());
        assert!(captured.lookup("make").is_ok());
        drop(interp);
        // The captured chain reaches the root, whose bindings are now gone.
        assert!(captured.lookup("inner").is_ok());
        assert!(captured.lookup("make").is_err());
    }
}
