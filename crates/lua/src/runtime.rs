//! Lua runtime wrapper for meique
//!
//! Wraps an `mlua::Lua` with the operations the build engine needs:
//! registering host functions, executing chunks with script context in
//! errors, and a per-interpreter host-state side-channel used by
//! registered callbacks to reach their owner.

use std::path::Path;

use mlua::{FromLuaMulti, IntoLuaMulti, Lua, MaybeSend};
use tracing::debug;

use crate::{Error, Result};

/// The Lua runtime environment
pub struct LuaRuntime {
    lua: Lua,
}

impl LuaRuntime {
    pub fn new() -> Self {
        Self { lua: Lua::new() }
    }

    /// Access to the raw interpreter, for callers that marshal values directly.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Register a host function as a global callable.
    pub fn register<F, A, R>(&self, name: &str, func: F) -> Result<()>
    where
        F: Fn(&Lua, A) -> mlua::Result<R> + MaybeSend + 'static,
        A: FromLuaMulti,
        R: IntoLuaMulti,
    {
        let f = self.lua.create_function(func)?;
        self.lua.globals().set(name, f)?;
        debug!(name, "registered host function");
        Ok(())
    }

    /// Set a global value visible to scripts.
    pub fn set_global<V: mlua::IntoLua>(&self, name: &str, value: V) -> Result<()> {
        self.lua.globals().set(name, value)?;
        Ok(())
    }

    /// Attach host state to this interpreter instance.
    ///
    /// Registered callbacks retrieve it with [`with_host_state`]; the state
    /// is keyed by the interpreter, so two runtimes never share it.
    pub fn set_host_state<T: 'static>(&self, state: T) {
        self.lua.set_app_data(state);
    }

    /// Take the host state back out of the interpreter.
    pub fn take_host_state<T: 'static>(&self) -> Option<T> {
        self.lua.remove_app_data::<T>()
    }

    /// Run a script file. Failures carry the file name.
    pub fn exec_file(&self, path: &Path) -> Result<()> {
        let source = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "executing script");
        self.lua
            .load(&source)
            .set_name(path.to_string_lossy())
            .exec()
            .map_err(|e| Error::Eval(format!("{}: {}", path.display(), script_error(&e))))
    }

    /// Run an in-memory chunk under the given name.
    pub fn exec_source(&self, name: &str, source: &str) -> Result<()> {
        self.lua
            .load(source)
            .set_name(name)
            .exec()
            .map_err(|e| Error::Eval(format!("{}: {}", name, script_error(&e))))
    }
}

impl Default for LuaRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Reach the host state attached to an interpreter from inside a callback.
///
/// Raises an interpreter-level error if no state of that type is attached,
/// which propagates out of the outermost script call.
pub fn with_host_state<T: 'static, R>(
    lua: &Lua,
    f: impl FnOnce(&mut T) -> mlua::Result<R>,
) -> mlua::Result<R> {
    let mut state = lua.app_data_mut::<T>().ok_or_else(|| {
        mlua::Error::RuntimeError("no host state attached to this interpreter".to_string())
    })?;
    f(&mut state)
}

/// Unwrap callback errors so the user sees the raised message, not the
/// interpreter's traceback plumbing around it.
fn script_error(error: &mlua::Error) -> String {
    match error {
        mlua::Error::CallbackError { cause, .. } => script_error(cause),
        other => other.to_string(),
    }
}
