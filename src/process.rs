//! Realising a parsed pipeline as a set of processes.
//!
//! A single built-in runs in the calling process so that `cd` and `setenv`
//! persist. Everything else gets one forked child per stage, connected by
//! anonymous pipes. Inside a child the pipe ends are wired first and the
//! stage's own `<`/`>` redirections second, so a declared file always wins
//! over the pipe for the same stream.

use crate::builtin::Builtin;
use crate::command::{Command, ExitCode, Pipeline};
use crate::env::Environment;
use crate::error::{ExecError, ShellError};
use crate::external::ExternalProgram;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{self, ForkResult, Pid};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::mem::ManuallyDrop;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use tracing::{debug, warn};

/// Permission bits of files created by output redirection.
const OUTPUT_MODE: u32 = 0o644;

/// Runs `pipeline` to completion and returns the exit status of its last stage.
///
/// Parent-side failures (pipe, fork, wait) are returned as [`ShellError::Resource`];
/// failures inside a stage only affect that stage's status.
pub fn execute(pipeline: &Pipeline, env: &mut Environment) -> Result<ExitCode, ShellError> {
    let commands = pipeline.commands();
    if let [command] = commands {
        if let Some(builtin) = Builtin::lookup(&command.program) {
            debug!(builtin = builtin.name(), "running built-in in process");
            return Ok(run_builtin_in_process(builtin, command, env));
        }
    }
    spawn_and_reap(commands, env)
}

/// Both ends of one anonymous pipe.
struct Pipe {
    read: OwnedFd,
    write: OwnedFd,
}

/// The pipes between adjacent stages; pipe `i` connects stage `i` to stage `i + 1`.
///
/// Dropping the set closes every end it still owns.
struct PipeSet {
    pipes: Vec<Pipe>,
}

impl PipeSet {
    fn new(count: usize) -> Result<Self, ShellError> {
        let mut pipes = Vec::with_capacity(count);
        for _ in 0..count {
            let (read, write) = unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| {
                warn!(created = pipes.len(), wanted = count, error = %e, "pipe failed");
                ShellError::resource("pipe", e)
            })?;
            pipes.push(Pipe { read, write });
        }
        Ok(Self { pipes })
    }

    fn ends_for(&self, stage: usize) -> StageEnds {
        StageEnds {
            stdin: stage
                .checked_sub(1)
                .map(|prev| self.pipes[prev].read.as_raw_fd()),
            stdout: self.pipes.get(stage).map(|pipe| pipe.write.as_raw_fd()),
        }
    }
}

/// Pipe descriptors a stage reads from and writes to, if any.
#[derive(Debug, Clone, Copy)]
struct StageEnds {
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
}

/// What a stage runs once its descriptors are in place.
enum StageProgram {
    Builtin(Builtin),
    External(Result<ExternalProgram, ExecError>),
}

impl StageProgram {
    fn resolve(command: &Command, env: &Environment) -> Self {
        match Builtin::lookup(&command.program) {
            Some(builtin) => StageProgram::Builtin(builtin),
            None => StageProgram::External(ExternalProgram::prepare(command, env)),
        }
    }
}

fn spawn_and_reap(commands: &[Command], env: &mut Environment) -> Result<ExitCode, ShellError> {
    let programs: Vec<StageProgram> = commands
        .iter()
        .map(|command| StageProgram::resolve(command, env))
        .collect();
    let pipes = PipeSet::new(commands.len().saturating_sub(1))?;

    // Buffered output would otherwise be duplicated into every child.
    let _ = io::stdout().flush();

    let mut children: Vec<Pid> = Vec::with_capacity(commands.len());
    for (index, (command, program)) in commands.iter().zip(&programs).enumerate() {
        let ends = pipes.ends_for(index);
        // SAFETY: the child only rewires descriptors, then execs or `_exit`s in `run_stage`.
        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => run_stage(command, program, ends, pipes, env),
            Ok(ForkResult::Parent { child }) => {
                debug!(stage = index, pid = child.as_raw(), program = %command.program, "spawned stage");
                children.push(child);
            }
            Err(e) => {
                warn!(stage = index, error = %e, "fork failed, killing started stages");
                drop(pipes);
                abort_children(&children);
                return Err(ShellError::resource("fork", e));
            }
        }
    }
    drop(pipes);

    let mut last_status = 0;
    let mut wait_error = None;
    for (index, pid) in children.into_iter().enumerate() {
        match wait_for(pid) {
            Ok(status) => {
                debug!(stage = index, pid = pid.as_raw(), status, "reaped stage");
                last_status = status;
            }
            Err(e) => {
                warn!(stage = index, pid = pid.as_raw(), error = %e, "waitpid failed");
                wait_error.get_or_insert(e);
            }
        }
    }
    match wait_error {
        Some(e) => Err(ShellError::resource("waitpid", e)),
        None => Ok(last_status),
    }
}

/// Body of a forked stage. Never returns into the forking loop.
fn run_stage(
    command: &Command,
    program: &StageProgram,
    ends: StageEnds,
    pipes: PipeSet,
    env: &mut Environment,
) -> ! {
    reset_signal_dispositions();

    let code = match prepare_descriptors(command, ends, pipes) {
        Ok(()) => match program {
            StageProgram::Builtin(builtin) => {
                let mut stdout = raw_stdout();
                builtin.run(command.args(), &mut *stdout, env)
            }
            StageProgram::External(Ok(external)) => match external.exec() {
                Ok(never) => match never {},
                Err(e) => report(&e),
            },
            StageProgram::External(Err(e)) => report(e),
        },
        Err(e) => report(&e),
    };

    // SAFETY: `_exit` skips atexit handlers and buffers inherited from the parent.
    unsafe { libc::_exit(code) }
}

fn report(err: &ExecError) -> ExitCode {
    eprintln!("{err}");
    err.exit_code()
}

/// Pipe ends first, then file redirections on top of them.
fn prepare_descriptors(command: &Command, ends: StageEnds, pipes: PipeSet) -> Result<(), ExecError> {
    if let Some(fd) = ends.stdin {
        unistd::dup2(fd, libc::STDIN_FILENO).map_err(ExecError::Dup)?;
    }
    if let Some(fd) = ends.stdout {
        unistd::dup2(fd, libc::STDOUT_FILENO).map_err(ExecError::Dup)?;
    }
    drop(pipes);

    if let Some(path) = &command.input_path {
        let file = open_input(path)?;
        unistd::dup2(file.as_raw_fd(), libc::STDIN_FILENO).map_err(ExecError::Dup)?;
    }
    if let Some(path) = &command.output_path {
        let file = open_output(path, command.append)?;
        unistd::dup2(file.as_raw_fd(), libc::STDOUT_FILENO).map_err(ExecError::Dup)?;
    }
    Ok(())
}

fn open_input(path: &str) -> Result<File, ExecError> {
    File::open(path).map_err(|source| ExecError::Redirect {
        path: path.to_string(),
        source,
    })
}

fn open_output(path: &str, append: bool) -> Result<File, ExecError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).mode(OUTPUT_MODE);
    if append {
        options.append(true);
    } else {
        options.truncate(true);
    }
    options.open(path).map_err(|source| ExecError::Redirect {
        path: path.to_string(),
        source,
    })
}

/// Runs a built-in without forking, honouring its own redirections.
///
/// A declared input file is opened so a missing file is reported, but
/// built-ins never read standard input.
fn run_builtin_in_process(builtin: Builtin, command: &Command, env: &mut Environment) -> ExitCode {
    if let Some(path) = &command.input_path {
        if let Err(e) = open_input(path) {
            return report(&e);
        }
    }
    match &command.output_path {
        Some(path) => match open_output(path, command.append) {
            Ok(mut file) => builtin.run(command.args(), &mut file, env),
            Err(e) => report(&e),
        },
        None => builtin.run(command.args(), &mut io::stdout().lock(), env),
    }
}

/// Standard output of a forked child, written without the parent's stdout lock or buffer.
fn raw_stdout() -> ManuallyDrop<File> {
    // SAFETY: fd 1 stays open for the lifetime of the child; `ManuallyDrop` keeps it open.
    ManuallyDrop::new(unsafe { File::from_raw_fd(libc::STDOUT_FILENO) })
}

/// Children start with default signal handling even if the shell ignores some signals.
fn reset_signal_dispositions() {
    for sig in [Signal::SIGINT, Signal::SIGQUIT, Signal::SIGPIPE] {
        // SAFETY: installing `SigDfl` does not run any handler code.
        let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
    }
}

fn wait_for(pid: Pid) -> nix::Result<ExitCode> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(code),
            Ok(WaitStatus::Signaled(_, sig, _)) => return Ok(128 + sig as i32),
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
}

fn abort_children(children: &[Pid]) {
    for &pid in children {
        let _ = signal::kill(pid, Signal::SIGKILL);
    }
    for &pid in children {
        let _ = wait_for(pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_line;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn make_unique_temp_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "process_test_{}_{}_{}",
            std::process::id(),
            tag,
            nanos
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn run(line: &str, env: &mut Environment) -> ExitCode {
        let pipeline = parse_line(line).unwrap().unwrap();
        execute(&pipeline, env).unwrap()
    }

    fn write_script(dir: &std::path::Path, body: &str) -> PathBuf {
        let script = dir.join("script.sh");
        fs::write(&script, body).unwrap();
        script
    }

    #[test]
    fn test_pipe_set_assigns_ends_per_stage() {
        let pipes = PipeSet::new(2).unwrap();
        let first = pipes.ends_for(0);
        let middle = pipes.ends_for(1);
        let last = pipes.ends_for(2);

        assert!(first.stdin.is_none());
        assert_eq!(first.stdout, Some(pipes.pipes[0].write.as_raw_fd()));
        assert_eq!(middle.stdin, Some(pipes.pipes[0].read.as_raw_fd()));
        assert_eq!(middle.stdout, Some(pipes.pipes[1].write.as_raw_fd()));
        assert_eq!(last.stdin, Some(pipes.pipes[1].read.as_raw_fd()));
        assert!(last.stdout.is_none());
    }

    #[test]
    fn test_single_stage_reports_exit_status() {
        let dir = make_unique_temp_dir("status");
        let script = write_script(&dir, "exit 7\n");
        let mut env = Environment::new();

        assert_eq!(run("true", &mut env), 0);
        assert_eq!(run("false", &mut env), 1);
        assert_eq!(run(&format!("sh {}", script.display()), &mut env), 7);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_program_exits_127() {
        let mut env = Environment::new();
        assert_eq!(run("definitely-not-a-program-4242", &mut env), 127);
        assert_eq!(run("true | definitely-not-a-program-4242", &mut env), 127);
    }

    #[test]
    fn test_last_stage_status_is_pipeline_status() {
        let mut env = Environment::new();
        assert_eq!(run("false | true", &mut env), 0);
        assert_eq!(run("true | false", &mut env), 1);
    }

    #[test]
    fn test_pipeline_output_reaches_file() {
        let dir = make_unique_temp_dir("sort");
        let out = dir.join("out.txt");
        let mut env = Environment::new();

        let line = format!("printf b\\na\\nc\\n | sort > {}", out.display());
        assert_eq!(run(&line, &mut env), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "a\nb\nc\n");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_file_redirection_wins_over_pipe() {
        let dir = make_unique_temp_dir("precedence");
        let input = dir.join("in.txt");
        let out = dir.join("out.txt");
        let piped_out = dir.join("piped.txt");
        fs::write(&input, "from file\n").unwrap();
        let mut env = Environment::new();

        let line = format!(
            "echo from pipe | cat < {} > {} | cat > {}",
            input.display(),
            out.display(),
            piped_out.display()
        );
        assert_eq!(run(&line, &mut env), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "from file\n");
        assert_eq!(fs::read_to_string(&piped_out).unwrap(), "");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_bad_input_file_fails_only_its_stage() {
        let dir = make_unique_temp_dir("badinput");
        let missing = dir.join("missing.txt");
        let out = dir.join("out.txt");
        let mut env = Environment::new();

        let line = format!(
            "echo hello | cat < {} | cat > {}",
            missing.display(),
            out.display()
        );
        assert_eq!(run(&line, &mut env), 0);
        assert!(out.exists(), "third stage must still run");
        assert_eq!(fs::read_to_string(&out).unwrap(), "");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_append_and_truncate_redirection() {
        let dir = make_unique_temp_dir("append");
        let out = dir.join("log.txt");
        let mut env = Environment::new();

        run(&format!("printf one\\n > {}", out.display()), &mut env);
        run(&format!("printf two\\n >> {}", out.display()), &mut env);
        assert_eq!(fs::read_to_string(&out).unwrap(), "one\ntwo\n");

        run(&format!("printf three\\n > {}", out.display()), &mut env);
        assert_eq!(fs::read_to_string(&out).unwrap(), "three\n");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_output_files_are_created_0644() {
        use std::os::unix::fs::PermissionsExt;

        let dir = make_unique_temp_dir("mode");
        let out = dir.join("new.txt");
        let mut env = Environment::new();

        run(&format!("true > {}", out.display()), &mut env);
        let mode = fs::metadata(&out).unwrap().permissions().mode() & 0o777;
        // the process umask can only remove bits
        assert_eq!(mode & !0o644, 0, "unexpected mode {mode:o}");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_builtin_stage_inside_pipeline() {
        let dir = make_unique_temp_dir("builtin_stage");
        let out = dir.join("out.txt");
        let mut env = Environment::new();

        let line = format!("echo piped words | cat > {}", out.display());
        assert_eq!(run(&line, &mut env), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "piped words\n");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_builtin_state_in_pipeline_stays_in_child() {
        let mut env = Environment::new();
        run("setenv PIPELINE_ONLY yes | true", &mut env);
        assert_eq!(env.get_var("PIPELINE_ONLY"), None);
    }

    #[test]
    fn test_in_process_builtin_honours_output_redirection() {
        let dir = make_unique_temp_dir("builtin_redirect");
        let out = dir.join("echo.txt");
        let mut env = Environment::new();

        assert_eq!(run(&format!("echo a b > {}", out.display()), &mut env), 0);
        assert_eq!(run(&format!("echo c >> {}", out.display()), &mut env), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "a b\nc\n");

        let missing = dir.join("missing.txt");
        assert_eq!(run(&format!("echo x < {}", missing.display()), &mut env), 1);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_environment_changes_reach_children() {
        let dir = make_unique_temp_dir("envp");
        let out = dir.join("env.txt");
        let mut env = Environment::new();

        assert_eq!(run("setenv SHELL_TEST_VALUE visible", &mut env), 0);
        run(&format!("printenv SHELL_TEST_VALUE > {}", out.display()), &mut env);
        assert_eq!(fs::read_to_string(&out).unwrap(), "visible\n");

        assert_eq!(run("unsetenv SHELL_TEST_VALUE", &mut env), 0);
        assert_eq!(run("printenv SHELL_TEST_VALUE", &mut env), 1);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_signal_termination_maps_above_128() {
        let dir = make_unique_temp_dir("signal");
        let script = write_script(&dir, "kill -9 $$\n");
        let mut env = Environment::new();

        assert_eq!(run(&format!("sh {}", script.display()), &mut env), 128 + 9);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_abort_children_kills_and_reaps() {
        use nix::sys::wait::WaitPidFlag;
        use std::time::{Duration, Instant};

        let sleepers: Vec<std::process::Child> = (0..2)
            .map(|_| std::process::Command::new("sleep").arg("30").spawn().unwrap())
            .collect();
        let pids: Vec<Pid> = sleepers
            .iter()
            .map(|child| Pid::from_raw(child.id() as i32))
            .collect();

        let started = Instant::now();
        abort_children(&pids);
        assert!(started.elapsed() < Duration::from_secs(10));

        // already reaped, so there is nothing left to wait for
        for pid in pids {
            assert_eq!(
                waitpid(pid, Some(WaitPidFlag::WNOHANG)),
                Err(Errno::ECHILD)
            );
        }
    }
}
