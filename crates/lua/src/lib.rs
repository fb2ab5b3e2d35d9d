//! meique-lua: the host-binding layer between meique and the embedded
//! Lua interpreter.
//!
//! Both the project description (`meique.lua`) and the configuration cache
//! (`meiquecache.lua`) are Lua programs; this crate wraps the interpreter
//! with what the build engine needs: host-function registration, chunk
//! execution with script context in errors, table marshalling, and a
//! per-interpreter side-channel so host callbacks can reach their owner
//! without globals.

mod error;
mod marshal;
mod runtime;

pub use error::Error;
pub use marshal::{
    get_integer_field, get_string_field, opt_string_field, table_to_string_list,
    table_to_string_map,
};
pub use runtime::{with_host_state, LuaRuntime};

// Re-exported so dependents register callbacks without a direct mlua dep.
pub use mlua;

/// Result type for host-binding operations
pub type Result<T> = std::result::Result<T, Error>;
