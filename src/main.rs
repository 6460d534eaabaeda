//! malrs command line: an interactive read-eval-print loop.

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use malrs::repl::{self, LineSource};
use malrs::{Interpreter, InterpreterConfig};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{debug, warn};

/// Command line options
#[derive(Parser)]
#[command(name = "malrs")]
#[command(version, about = "A small Lisp with tail calls and closures", long_about = None)]
struct Cli {
    /// Evaluate one expression, print the result and exit
    #[arg(short, long, value_name = "EXPR")]
    eval: Option<String>,

    /// Skip the standard prelude
    #[arg(long)]
    no_prelude: bool,

    /// History file for the line editor
    #[arg(long, value_name = "PATH")]
    history: Option<PathBuf>,

    /// Prompt shown before each line
    #[arg(long, default_value = "user> ")]
    prompt: String,

    /// Log to stderr (RUST_LOG selects the filter, default `malrs=debug`)
    #[arg(short, long)]
    verbose: bool,
}

/// Install a stderr subscriber when logging was asked for.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    if !verbose && std::env::var("RUST_LOG").is_err() {
        return;
    }
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("malrs=debug"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(true))
        .with(filter)
        .init();
}

fn default_history_path() -> PathBuf {
    std::env::temp_dir().join(".mal_history")
}

/// rustyline-backed line source that persists its history on drop
struct Editor {
    editor: DefaultEditor,
    history: PathBuf,
}

impl Editor {
    fn open(history: PathBuf) -> Result<Self, ReadlineError> {
        let mut editor = DefaultEditor::new()?;
        if let Err(err) = editor.load_history(&history) {
            // A missing file on first start is normal.
            debug!(path = %history.display(), error = %err, "no history loaded");
        }
        Ok(Editor { editor, history })
    }
}

impl LineSource for Editor {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
            Err(ReadlineError::Io(err)) => Err(err),
            Err(err) => Err(io::Error::other(err.to_string())),
        }
    }
}

impl Drop for Editor {
    fn drop(&mut self) {
        if let Err(err) = self.editor.save_history(&self.history) {
            warn!(path = %self.history.display(), error = %err, "could not save history");
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = InterpreterConfig {
        load_prelude: !cli.no_prelude,
        ..InterpreterConfig::default()
    };
    let interpreter = Interpreter::with_config(&config);

    let mut stdout = io::stdout().lock();
    let result = if let Some(expr) = cli.eval {
        writeln!(stdout, "{}", interpreter.rep(&expr))
    } else if io::stdin().is_terminal() {
        match Editor::open(cli.history.unwrap_or_else(default_history_path)) {
            Ok(mut editor) => repl::run(&interpreter, &mut editor, &mut stdout, &cli.prompt),
            Err(err) => {
                eprintln!("could not start line editor: {err}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        let mut lines = io::stdin().lock().lines();
        repl::run(&interpreter, &mut lines, &mut stdout, &cli.prompt)
    };

    match result.and_then(|()| stdout.flush()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("I/O error: {err}");
            ExitCode::FAILURE
        }
    }
}
