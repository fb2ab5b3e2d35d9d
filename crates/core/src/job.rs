//! Deferred units of build work

use std::path::PathBuf;

use meique_platform as os;
use meique_platform::ExecMode;
use tracing::debug;

/// Identifier of a scheduled job within one build invocation
pub type JobId = usize;

/// A single deferred unit of work producing an exit code
pub trait Job: Send + std::fmt::Debug {
    fn run(&self) -> i32;
}

/// A job that executes a command through the OS façade,
/// optionally in a working directory.
#[derive(Debug)]
pub struct OsCommandJob {
    command: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl OsCommandJob {
    pub fn new<S: Into<String>>(command: S, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            working_dir: None,
        }
    }

    pub fn set_working_directory<P: Into<PathBuf>>(&mut self, dir: P) {
        self.working_dir = Some(dir.into());
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The full command line, for diagnostics.
    pub fn command_line(&self) -> String {
        let mut line = self.command.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl Job for OsCommandJob {
    fn run(&self) -> i32 {
        debug!(command = %self.command_line(), "running job");
        match os::exec(
            &self.command,
            &self.args,
            self.working_dir.as_deref(),
            ExecMode::PassStderr,
        ) {
            Ok(result) => {
                if !result.output.is_empty() {
                    print!("{}", result.output);
                }
                result.exit_code
            }
            Err(e) => {
                eprintln!("meique: {e}");
                127
            }
        }
    }
}

/// Cache mutations committed when a job exits successfully.
///
/// Workers never touch the cache; the dispatcher applies these after
/// observing the job's completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheUpdate {
    FileHash { source: String, hash: String },
    TargetHash { target: String, hash: String },
}

/// A job wired into the dependency graph of one build invocation
#[derive(Debug)]
pub struct ScheduledJob {
    pub id: JobId,
    /// One line shown to the user when the job is dispatched.
    pub description: String,
    /// Jobs that must complete successfully before this one may start.
    pub deps: Vec<JobId>,
    pub job: Box<dyn Job>,
    pub updates: Vec<CacheUpdate>,
}

impl ScheduledJob {
    pub fn new(id: JobId, description: String, job: Box<dyn Job>) -> Self {
        Self {
            id,
            description,
            deps: Vec::new(),
            job,
            updates: Vec::new(),
        }
    }

    pub fn is_runnable(&self, completed: &std::collections::HashSet<JobId>) -> bool {
        self.deps.iter().all(|dep| completed.contains(dep))
    }
}
