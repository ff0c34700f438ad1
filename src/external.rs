use crate::command::Command;
use crate::env::Environment;
use crate::error::ExecError;
use std::borrow::Cow;
use std::convert::Infallible;
use std::ffi::{CString, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// An external program ready to be passed to `execve`.
///
/// Prepared in the parent so that a forked child only has to exec it.
#[derive(Debug)]
pub(crate) struct ExternalProgram {
    program: String,
    path: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
}

impl ExternalProgram {
    /// Resolves `command.program` against `PATH` and converts argv and the
    /// environment into C strings.
    pub(crate) fn prepare(command: &Command, env: &Environment) -> Result<Self, ExecError> {
        let search_paths = env.get_var("PATH").unwrap_or_default();
        let path = find_command_path(OsStr::new(&search_paths), Path::new(&command.program))
            .ok_or_else(|| ExecError::NotFound {
                program: command.program.clone(),
            })?;

        let invalid = |_| ExecError::InvalidArgument {
            program: command.program.clone(),
        };
        let path = CString::new(path.as_os_str().as_bytes()).map_err(invalid)?;
        let argv = command
            .argv
            .iter()
            .map(|arg| CString::new(arg.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;
        let envp = env
            .to_envp()
            .into_iter()
            .map(CString::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;

        Ok(Self {
            program: command.program.clone(),
            path,
            argv,
            envp,
        })
    }

    /// Replaces the current process image. Only returns on failure.
    pub(crate) fn exec(&self) -> Result<Infallible, ExecError> {
        nix::unistd::execve(&self.path, &self.argv, &self.envp).map_err(|source| ExecError::Exec {
            program: self.program.clone(),
            source,
        })
    }
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it names a file.
/// - Relative with multiple components (e.g., `bin/sh`): returns it if it names a file.
/// - `./foo`: returns it if it names a file.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first match.
/// - Empty path: returns `None`.
///
/// Returns either a borrowed reference to the provided `path` or an owned `PathBuf`
/// when the result is discovered via PATH lookup.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() || path.starts_with("./") {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (None, _) => None,
        (Some(single), None) => find_in_path(search_paths, single.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .filter(|dir| !dir.as_os_str().is_empty())
        .find_map(|dir| find_by_path(&dir.join(cmd)).map(Path::to_path_buf))
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.is_file() { Some(path) } else { None }
}
