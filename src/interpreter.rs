use crate::command::ExitCode;
use crate::config::Config;
use crate::env::Environment;
use crate::error::ShellError;
use crate::history::{LineRecorder, RollingHistory};
use crate::parser;
use crate::process;
use nix::sys::signal::{self, SigHandler, Signal};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{debug, info};

/// Status reported for a line that could not be parsed or started.
const EXIT_FAILURE: ExitCode = 1;

/// The read-eval loop around the pipeline parser and the process orchestrator.
///
/// The interpreter owns the shell [`Environment`] and forwards every executed
/// line to a [`LineRecorder`].
///
/// Example
/// ```
/// use pipeline_shell::{Config, Interpreter};
/// let mut sh = Interpreter::new(Config::default());
/// assert_eq!(sh.run_line("true | true"), 0);
/// assert_eq!(sh.run_line("false"), 1);
/// ```
pub struct Interpreter {
    env: Environment,
    config: Config,
    recorder: Box<dyn LineRecorder>,
    previous_line: Option<String>,
    last_status: ExitCode,
}

impl Interpreter {
    /// Create an interpreter that records lines into a [`RollingHistory`].
    pub fn new(config: Config) -> Self {
        let recorder = Box::new(RollingHistory::new(config.history_size));
        Self::with_recorder(config, recorder)
    }

    /// Create an interpreter with a custom line recorder.
    pub fn with_recorder(config: Config, recorder: Box<dyn LineRecorder>) -> Self {
        let mut env = Environment::new();
        if let Ok(exe) = std::env::current_exe() {
            env.set_var("SHELL", exe.to_string_lossy());
        }
        Self {
            env,
            config,
            recorder,
            previous_line: None,
            last_status: 0,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Status of the most recently executed line.
    pub fn last_status(&self) -> ExitCode {
        self.last_status
    }

    /// Parse and execute one line.
    ///
    /// Returns `Ok(None)` when the line is blank and nothing ran.
    pub fn execute_line(&mut self, line: &str) -> Result<Option<ExitCode>, ShellError> {
        let Some(pipeline) = parser::parse_line(line)? else {
            return Ok(None);
        };
        debug!(stages = pipeline.len(), ?pipeline, "parsed line");

        let result = process::execute(&pipeline, &mut self.env);
        self.record(line.trim());
        result.map(Some)
    }

    /// Execute one line, reporting any failure on standard error.
    ///
    /// Returns the line's exit status; a blank line keeps the previous one.
    pub fn run_line(&mut self, line: &str) -> ExitCode {
        match self.execute_line(line) {
            Ok(Some(status)) => self.last_status = status,
            Ok(None) => {}
            Err(e) => {
                eprintln!("{e}");
                self.last_status = EXIT_FAILURE;
            }
        }
        self.last_status
    }

    /// The interactive Read-Eval-Print Loop.
    ///
    /// Runs until end of input or the `exit` built-in and returns the status to exit with.
    pub fn repl(&mut self) -> anyhow::Result<ExitCode> {
        let mut rl = DefaultEditor::new()?;
        // SAFETY: `SigIgn` installs no handler code; children restore the default.
        unsafe { signal::signal(Signal::SIGINT, SigHandler::SigIgn) }?;

        loop {
            match rl.readline(&self.prompt()) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    self.run_line(&line);
                    if let Some(code) = self.env.exit_request {
                        info!(code, "exit requested");
                        return Ok(code);
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => {
                    println!();
                    return Ok(self.last_status);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn prompt(&self) -> String {
        let cwd = self.env.current_dir.display();
        if self.config.color_prompt {
            format!("\x1b[1;32m{cwd}\x1b[0m$ ")
        } else {
            format!("{cwd}$ ")
        }
    }

    fn record(&mut self, line: &str) {
        self.recorder.record_line(line);
        if let Some(previous) = &self.previous_line {
            self.recorder.record_sequence(previous, line);
        }
        self.previous_line = Some(line.to_string());
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
