use argh::FromArgs;
use std::io::IsTerminal;

/// Number of executed lines kept by the default history recorder.
pub const DEFAULT_HISTORY_SIZE: usize = 1000;

/// Log filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(FromArgs, Debug)]
/// A line-oriented command interpreter with pipes and file redirection.
pub struct Args {
    #[argh(option, short = 'c')]
    /// run a single line and exit with its status.
    pub command: Option<String>,

    #[argh(option, default = "DEFAULT_HISTORY_SIZE")]
    /// number of executed lines kept in memory.
    pub history_size: usize,

    #[argh(option, default = "DEFAULT_LOG_LEVEL.to_string()")]
    /// tracing filter used when RUST_LOG is not set, e.g. `debug` or `pipeline_shell=trace`.
    pub log_level: String,
}

/// Settings of an [`Interpreter`](crate::Interpreter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Capacity of the rolling history handed to the line recorder.
    pub history_size: usize,
    /// Print the prompt in color.
    pub color_prompt: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_size: DEFAULT_HISTORY_SIZE,
            color_prompt: std::io::stdout().is_terminal(),
        }
    }
}

impl From<&Args> for Config {
    fn from(args: &Args) -> Self {
        Self {
            history_size: args.history_size,
            ..Self::default()
        }
    }
}
