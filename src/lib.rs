//! A line-oriented command interpreter built around a pipeline parser and a
//! process orchestrator.
//!
//! A line is split on `|` into stages, each stage into whitespace-separated
//! words, and `<`, `>`, `>>` redirections are pulled out of the words. The
//! resulting [`Pipeline`] is then executed: a lone built-in runs in the calling
//! process, anything else runs as one forked child per stage connected by
//! anonymous pipes.
//!
//! The main entry point is [`Interpreter`], which owns the shell
//! [`Environment`](env::Environment) and runs lines either one at a time or in
//! an interactive loop. The lower layers ([`parser`], [`process`]) are public
//! for embedding and testing.

mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
mod external;
pub mod history;
mod interpreter;
pub mod lexer;
pub mod parser;
pub mod process;
mod proc_info;

pub use builtin::Builtin;
pub use command::{Command, ExitCode, Pipeline};
pub use config::Config;
pub use error::{ExecError, ParseError, ShellError};
/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
