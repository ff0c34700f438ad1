//! Process metadata read from the `/proc` pseudo-filesystem.

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Default mount point of the process information pseudo-filesystem.
pub const PROC_ROOT: &str = "/proc";

/// Placeholder printed when the executable path cannot be resolved.
pub const UNKNOWN_EXECUTABLE: &str = "Unknown";

static VM_RSS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^VmRSS:\s+(\d+)\s*kB").expect("valid VmRSS pattern"));

/// Snapshot of one process, as printed by `pinfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: i32,
    /// Single-letter scheduler state (`R`, `S`, `Z`, ...).
    pub state: char,
    /// Resident set size in kB; kernel threads have none.
    pub resident_kb: Option<u64>,
    /// Executable image, or `None` when the link cannot be read.
    pub executable: Option<PathBuf>,
}

impl ProcessInfo {
    /// Reads the state, resident memory and executable of `pid` below `proc_root`.
    pub fn read(proc_root: &Path, pid: i32) -> Result<Self> {
        let dir = proc_root.join(pid.to_string());
        let stat = fs::read_to_string(dir.join("stat"))
            .with_context(|| format!("no such process {pid}"))?;
        let state = parse_state(&stat)
            .ok_or_else(|| anyhow!("malformed {}", dir.join("stat").display()))?;
        let resident_kb = fs::read_to_string(dir.join("status"))
            .ok()
            .and_then(|status| parse_resident_kb(&status));
        let executable = fs::read_link(dir.join("exe")).ok();
        Ok(Self {
            pid,
            state,
            resident_kb,
            executable,
        })
    }
}

impl fmt::Display for ProcessInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pid -- {}", self.pid)?;
        writeln!(f, "Process Status -- {}", self.state)?;
        writeln!(f, "memory -- {} kB", self.resident_kb.unwrap_or(0))?;
        match &self.executable {
            Some(path) => writeln!(f, "Executable Path -- {}", path.display()),
            None => writeln!(f, "Executable Path -- {UNKNOWN_EXECUTABLE}"),
        }
    }
}

/// The state is the first field after the parenthesised command name, which
/// may itself contain spaces and parentheses.
fn parse_state(stat: &str) -> Option<char> {
    let (_, rest) = stat.rsplit_once(')')?;
    rest.split_whitespace().next()?.chars().next()
}

fn parse_resident_kb(status: &str) -> Option<u64> {
    VM_RSS.captures(status)?.get(1)?.as_str().parse().ok()
}
