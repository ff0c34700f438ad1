use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

use crate::command::ExitCode;

/// Mutable, user-level view of the process environment used by the shell.
///
/// The environment contains:
/// - `vars`: variables passed to every external program at exec time.
/// - `current_dir`: the working directory, kept in sync with the process cwd by `cd`.
/// - `exit_request`: set by the `exit` built-in; the read-eval loop stops when present.
///
/// Built-ins mutate this value instead of the process environment, and the
/// orchestrator turns `vars` into the `envp` of each child.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// Exit status requested by the `exit` built-in.
    pub exit_request: Option<ExitCode>,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// Variables whose name or value is not valid UTF-8 are skipped.
    pub fn new() -> Self {
        let vars = stdenv::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars,
            current_dir,
            exit_request: None,
        }
    }

    /// Get the value of an environment variable.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    /// Set or override an environment variable.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Remove a variable; returns its previous value.
    pub fn remove_var(&mut self, key: &str) -> Option<String> {
        self.vars.remove(key)
    }

    /// `KEY=VALUE` pairs in the form `execve` expects.
    pub fn to_envp(&self) -> Vec<String> {
        self.vars.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
