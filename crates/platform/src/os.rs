//! Process execution, filesystem helpers, and process-level hooks

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use tracing::debug;

use crate::{PlatformError, Result};

/// How child process streams are captured by [`exec`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Capture stdout; stderr is inherited by the parent terminal.
    PassStderr,
    /// Capture both streams into the same buffer, stdout first.
    MergeStderr,
}

/// Outcome of a child process run to completion
#[derive(Debug)]
pub struct ExecResult {
    pub exit_code: i32,
    pub output: String,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Spawn a command, wait for it, and capture its output.
///
/// A child killed by a signal reports exit code 128+signal style -1 here;
/// callers only distinguish zero from non-zero.
pub fn exec<S: AsRef<str>>(
    cmd: &str,
    args: &[S],
    cwd: Option<&Path>,
    mode: ExecMode,
) -> Result<ExecResult> {
    let mut command = Command::new(cmd);
    for arg in args {
        command.arg(arg.as_ref());
    }
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    command.stdout(Stdio::piped());
    command.stderr(match mode {
        ExecMode::MergeStderr => Stdio::piped(),
        ExecMode::PassStderr => Stdio::inherit(),
    });

    debug!(command = %cmd, ?mode, "exec");
    let out = command.output().map_err(|source| PlatformError::Spawn {
        command: cmd.to_string(),
        source,
    })?;

    let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
    if mode == ExecMode::MergeStderr {
        output.push_str(&String::from_utf8_lossy(&out.stderr));
    }

    Ok(ExecResult {
        exit_code: out.status.code().unwrap_or(-1),
        output,
    })
}

/// Check whether a path exists (file or directory).
pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().exists()
}

/// Create a directory and all of its parents. Succeeds if it already exists.
pub fn mkdir<P: AsRef<Path>>(path: P) -> Result<()> {
    std::fs::create_dir_all(path.as_ref())?;
    Ok(())
}

/// Canonical directory form: absolute where resolvable, always a trailing `/`.
pub fn normalize_dir_path(path: &str) -> String {
    let resolved = match std::fs::canonicalize(path) {
        Ok(abs) => abs.to_string_lossy().into_owned(),
        Err(_) => path.trim_end_matches('/').to_string(),
    };
    if resolved.ends_with('/') {
        resolved
    } else {
        resolved + "/"
    }
}

/// Environment lookup; unset variables read as the empty string.
pub fn get_env(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

/// Number of logical CPU cores, at least 1.
pub fn number_of_cpu_cores() -> usize {
    num_cpus::get().max(1)
}

/// Default installation prefix used when none was configured.
pub fn default_install_prefix() -> String {
    "/usr/local/".to_string()
}

type InterruptHook = Box<dyn FnMut() + Send>;

fn interrupt_slot() -> &'static Mutex<Option<InterruptHook>> {
    static SLOT: OnceLock<Mutex<Option<InterruptHook>>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(None))
}

/// Install the process-interrupt (CTRL+C) hook.
///
/// The underlying OS handler is installed once; the hook itself lives in a
/// replaceable slot, so calling this again replaces the previous hook.
pub fn set_ctrl_c_handler<F: FnMut() + Send + 'static>(hook: F) -> Result<()> {
    static INSTALLED: OnceLock<()> = OnceLock::new();

    *interrupt_slot().lock().unwrap() = Some(Box::new(hook));

    let mut result = Ok(());
    INSTALLED.get_or_init(|| {
        result = ctrlc::set_handler(|| {
            if let Some(hook) = interrupt_slot().lock().unwrap().as_mut() {
                hook();
            }
        })
        .map_err(|e| PlatformError::InterruptHandler(e.to_string()));
    });
    result
}

/// Milliseconds elapsed on a monotonic clock, measured from first use.
pub fn time_in_millis() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_millis() as u64
}
