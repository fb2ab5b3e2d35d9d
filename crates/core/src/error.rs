//! Error taxonomy for the build engine
//!
//! Four user-visible kinds plus transparent wrappers. The driver maps all
//! of them to a non-zero process exit; configuration errors additionally
//! suppress cache auto-save for the run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad CLI usage; the driver prints usage and exits non-zero.
    #[error("{0}")]
    Argument(String),

    /// Project description or configure-time failure.
    #[error("{0}")]
    Config(String),

    /// The cache file is malformed or from an incompatible producer.
    #[error("{0}")]
    CacheCorrupted(String),

    /// A build job exited non-zero.
    #[error("{0}")]
    Build(String),

    #[error(transparent)]
    Lua(#[from] meique_lua::Error),

    #[error(transparent)]
    Platform(#[from] meique_platform::PlatformError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
