//! Error taxonomy of the parser and the process orchestrator.

use std::io;
use thiserror::Error;

/// Reasons a line could not be turned into a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A pipe-delimited segment contains no words (`a || b`, `| a`, `a |`).
    #[error("empty command in pipeline (stage {index})")]
    EmptyStage { index: usize },
}

/// Failures detected by the orchestrating process.
///
/// These abort the affected pipeline but never the shell itself.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// An OS resource (pipe, fork, wait, file) could not be obtained.
    #[error("{operation}: {source}")]
    Resource {
        operation: &'static str,
        #[source]
        source: io::Error,
    },
}

impl ShellError {
    pub(crate) fn resource(operation: &'static str, source: impl Into<io::Error>) -> Self {
        ShellError::Resource {
            operation,
            source: source.into(),
        }
    }
}

/// Failures inside a forked stage.
///
/// They are reported on the stage's standard error and turned into its exit
/// status; they never travel back to the parent.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{program}: command not found")]
    NotFound { program: String },

    #[error("open {path}: {source}")]
    Redirect {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{program}: argument contains a NUL byte")]
    InvalidArgument { program: String },

    #[error("dup2: {0}")]
    Dup(#[source] nix::Error),

    #[error("{program}: {source}")]
    Exec {
        program: String,
        #[source]
        source: nix::Error,
    },
}

impl ExecError {
    /// Exit status the failing stage terminates with.
    pub fn exit_code(&self) -> crate::command::ExitCode {
        use crate::command::{EXIT_CANNOT_EXECUTE, EXIT_NOT_FOUND, EXIT_SETUP_FAILED};
        match self {
            ExecError::NotFound { .. } => EXIT_NOT_FOUND,
            ExecError::Exec { .. } | ExecError::InvalidArgument { .. } => EXIT_CANNOT_EXECUTE,
            ExecError::Redirect { .. } | ExecError::Dup(_) => EXIT_SETUP_FAILED,
        }
    }
}
