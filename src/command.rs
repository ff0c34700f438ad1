/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Exit status of a stage whose program could not be found.
pub const EXIT_NOT_FOUND: ExitCode = 127;
/// Exit status of a stage whose program was found but could not be executed.
pub const EXIT_CANNOT_EXECUTE: ExitCode = 126;
/// Exit status of a stage that failed before running (redirection, fd setup).
pub const EXIT_SETUP_FAILED: ExitCode = 1;

/// One stage of a pipeline.
///
/// Redirection operators and their operands never appear in [`Command::argv`];
/// they are stored in [`Command::input_path`] and [`Command::output_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Executable name or built-in identifier. Equal to `argv[0]`.
    pub program: String,
    /// Arguments, starting with the program name itself.
    pub argv: Vec<String>,
    /// File to read standard input from (`< file`).
    pub input_path: Option<String>,
    /// File to write standard output to (`> file` or `>> file`).
    pub output_path: Option<String>,
    /// `true` for `>>`, `false` for `>`.
    pub append: bool,
}

impl Command {
    /// Arguments following the program name.
    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or_default()
    }
}

/// An ordered, non-empty sequence of commands connected by pipes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    /// Returns `None` for an empty command list, since a pipeline always has a stage.
    pub fn new(commands: Vec<Command>) -> Option<Self> {
        if commands.is_empty() {
            None
        } else {
            Some(Self { commands })
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Always `false`; kept for symmetry with [`Pipeline::len`].
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
