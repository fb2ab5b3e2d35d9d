//! Error types for meique-lua

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Eval(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}
