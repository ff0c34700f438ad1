use crate::command::ExitCode;
use crate::env::Environment;
use crate::proc_info::{PROC_ROOT, ProcessInfo};
use anyhow::{Context, Result, anyhow, bail};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in the process that dispatches them.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Executes the command, writing its regular output to `stdout`.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;
}

/// The kinds of built-in command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Cd,
    Pwd,
    Echo,
    Pinfo,
    Setenv,
    Unsetenv,
    Help,
    Exit,
}

struct BuiltinEntry {
    name: &'static str,
    kind: Builtin,
    summary: &'static str,
}

static BUILTINS: &[BuiltinEntry] = &[
    BuiltinEntry {
        name: "cd",
        kind: Builtin::Cd,
        summary: "change the current directory (default: $HOME)",
    },
    BuiltinEntry {
        name: "pwd",
        kind: Builtin::Pwd,
        summary: "print the current directory",
    },
    BuiltinEntry {
        name: "echo",
        kind: Builtin::Echo,
        summary: "print the arguments separated by spaces",
    },
    BuiltinEntry {
        name: "pinfo",
        kind: Builtin::Pinfo,
        summary: "show status, memory and executable of a process (default: the shell)",
    },
    BuiltinEntry {
        name: "setenv",
        kind: Builtin::Setenv,
        summary: "set an environment variable: setenv NAME [VALUE]",
    },
    BuiltinEntry {
        name: "unsetenv",
        kind: Builtin::Unsetenv,
        summary: "remove an environment variable: unsetenv NAME",
    },
    BuiltinEntry {
        name: "help",
        kind: Builtin::Help,
        summary: "show this help",
    },
    BuiltinEntry {
        name: "exit",
        kind: Builtin::Exit,
        summary: "leave the shell: exit [CODE]",
    },
];

impl Builtin {
    /// Finds the built-in registered under `name`.
    pub fn lookup(name: &str) -> Option<Self> {
        BUILTINS
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.kind)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Cd => "cd",
            Builtin::Pwd => "pwd",
            Builtin::Echo => "echo",
            Builtin::Pinfo => "pinfo",
            Builtin::Setenv => "setenv",
            Builtin::Unsetenv => "unsetenv",
            Builtin::Help => "help",
            Builtin::Exit => "exit",
        }
    }

    /// Parses `args` (without the command name) and runs the built-in.
    ///
    /// Errors are reported on standard error and turned into a non-zero status.
    pub fn run(self, args: &[String], stdout: &mut dyn Write, env: &mut Environment) -> ExitCode {
        let code = match self {
            Builtin::Cd => invoke::<Cd>(self, args, stdout, env),
            Builtin::Pwd => invoke::<Pwd>(self, args, stdout, env),
            Builtin::Echo => invoke::<Echo>(self, args, stdout, env),
            Builtin::Pinfo => invoke::<Pinfo>(self, args, stdout, env),
            Builtin::Setenv => invoke::<Setenv>(self, args, stdout, env),
            Builtin::Unsetenv => invoke::<Unsetenv>(self, args, stdout, env),
            Builtin::Help => invoke::<Help>(self, args, stdout, env),
            Builtin::Exit => invoke::<Exit>(self, args, stdout, env),
        };
        if let Err(e) = stdout.flush() {
            eprintln!("{}: {}", self.name(), e);
            return 1;
        }
        code
    }
}

fn invoke<T: BuiltinCommand>(
    builtin: Builtin,
    args: &[String],
    stdout: &mut dyn Write,
    env: &mut Environment,
) -> ExitCode {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match T::from_args(&[builtin.name()], &args) {
        Ok(cmd) => match cmd.execute(stdout, env) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("{}: {:#}", builtin.name(), e);
                1
            }
        },
        Err(EarlyExit { output, status }) => match status {
            Ok(()) => match writeln!(stdout, "{}", output.trim_end()) {
                Ok(()) => 0,
                Err(_) => 1,
            },
            Err(()) => {
                eprintln!("{}", output.trim_end());
                1
            }
        },
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => match env.get_var("HOME") {
                Some(home) => PathBuf::from(home),
                None => bail!("no target and HOME not set"),
            },
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        env::set_current_dir(&new_dir).with_context(|| new_dir.display().to_string())?;
        let resolved = env::current_dir().context("getcwd")?;
        env.set_var("PWD", resolved.to_string_lossy());
        env.current_dir = resolved;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        let cwd = env::current_dir().context("getcwd")?;
        writeln!(stdout, "{}", cwd.to_string_lossy())?;
        Ok(0)
    }
}

/// Write the arguments to standard output, separated by spaces, followed by a newline.
///
/// Every word is printed literally, so `echo` accepts no options.
pub struct Echo {
    pub words: Vec<String>,
}

impl FromArgs for Echo {
    fn from_args(_command_name: &[&str], args: &[&str]) -> Result<Self, EarlyExit> {
        Ok(Echo {
            words: args.iter().map(|s| s.to_string()).collect(),
        })
    }
}

impl BuiltinCommand for Echo {
    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "{}", self.words.join(" "))?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print the pid, status, resident memory and executable path of a process.
pub struct Pinfo {
    #[argh(positional)]
    /// process id to inspect; defaults to the shell itself.
    pub pid: Option<i32>,
}

impl BuiltinCommand for Pinfo {
    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        let pid = self.pid.unwrap_or_else(|| std::process::id() as i32);
        let info = ProcessInfo::read(Path::new(PROC_ROOT), pid)?;
        write!(stdout, "{}", info)?;
        Ok(0)
    }
}

fn check_var_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('=') || name.contains('\0') {
        return Err(anyhow!("invalid variable name {:?}", name));
    }
    Ok(())
}

#[derive(FromArgs)]
/// Set an environment variable for this shell and every program it starts.
pub struct Setenv {
    #[argh(positional)]
    /// name of the variable.
    pub name: String,

    #[argh(positional)]
    /// new value; the empty string when omitted.
    pub value: Option<String>,
}

impl BuiltinCommand for Setenv {
    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        check_var_name(&self.name)?;
        let value = self.value.unwrap_or_default();
        if value.contains('\0') {
            bail!("value of {} contains a NUL byte", self.name);
        }
        env.set_var(self.name, value);
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Remove an environment variable.
pub struct Unsetenv {
    #[argh(positional)]
    /// name of the variable.
    pub name: String,
}

impl BuiltinCommand for Unsetenv {
    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        check_var_name(&self.name)?;
        env.remove_var(&self.name);
        Ok(0)
    }
}

#[derive(FromArgs)]
/// List the built-in commands.
pub struct Help {}

impl BuiltinCommand for Help {
    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "Built-in commands:")?;
        for entry in BUILTINS {
            writeln!(stdout, "  {:<10}{}", entry.name, entry.summary)?;
        }
        writeln!(
            stdout,
            "Anything else is run from PATH. Use `|` to pipe and `<`, `>`, `>>` to redirect."
        )?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Exit the shell.
pub struct Exit {
    #[argh(positional)]
    /// exit status, 0 when omitted.
    pub code: Option<i32>,
}

impl BuiltinCommand for Exit {
    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let code = self.code.unwrap_or(0);
        env.exit_request = Some(code);
        Ok(code)
    }
}
