//! Compiler backend abstraction
//!
//! A backend turns resolved target options into compile and link jobs and
//! answers toolchain introspection queries. Backends are immutable after
//! construction and freely shareable across threads.

mod gcc;
mod options;

use std::sync::Arc;

pub use gcc::Gcc;
pub use options::{CompilerOptions, Language, LinkType, LinkerOptions};

use crate::job::OsCommandJob;
use crate::{Error, Result};

/// Capability set implemented by every compiler backend
pub trait Compiler: Send + Sync + std::fmt::Debug {
    /// Whether the toolchain was found when the backend probed it.
    fn is_available(&self) -> bool;

    /// Human-readable toolchain banner, e.g. the first `--version` line.
    fn full_name(&self) -> &str;

    fn version(&self) -> &str;

    /// Include directories searched implicitly by the toolchain.
    fn default_include_dirs(&self) -> &[String];

    /// Build an un-started job that compiles `source` into `output`.
    fn compile(
        &self,
        source: &str,
        output: &str,
        options: &CompilerOptions,
    ) -> Result<OsCommandJob>;

    /// Build an un-started job that links or archives `objects` into `output`.
    fn link(
        &self,
        output: &str,
        objects: &[String],
        options: &LinkerOptions,
    ) -> Result<OsCommandJob>;

    fn name_for_executable(&self, name: &str) -> String;
    fn name_for_static_library(&self, name: &str) -> String;
    fn name_for_shared_library(&self, name: &str) -> String;
}

/// Map a compiler id from the cache to a backend instance.
pub fn create_compiler(id: &str) -> Result<Arc<dyn Compiler>> {
    match id {
        "gcc" => Ok(Arc::new(Gcc::probe())),
        other => Err(Error::Config(format!("Unknown compiler: {other}"))),
    }
}

/// Probe the known backends and return the first available one.
///
/// Used at configure time; the winning id is recorded in the cache so
/// later runs resolve the same backend without probing alternatives.
pub fn find_compiler() -> Result<(String, Arc<dyn Compiler>)> {
    let gcc = Gcc::probe();
    if gcc.is_available() {
        return Ok(("gcc".to_string(), Arc::new(gcc)));
    }
    Err(Error::Config(
        "No working compiler found, meique needs a GCC toolchain in PATH.".to_string(),
    ))
}
