//! Platform abstractions for meique
//!
//! This crate provides the small OS façade the build engine depends on:
//! - Process execution with output capture
//! - File and directory helpers
//! - Environment lookup
//! - CPU count, monotonic clock, and the process-interrupt hook

mod error;
mod os;

pub use error::PlatformError;
pub use os::{
    default_install_prefix, exec, file_exists, get_env, mkdir, normalize_dir_path,
    number_of_cpu_cores, set_ctrl_c_handler, time_in_millis, ExecMode, ExecResult,
};

/// Result type for platform operations
pub type Result<T> = std::result::Result<T, PlatformError>;
