//! Error types for the engine adapter, game session and configuration.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::domain::Square;

/// Failures surfaced by the engine process and protocol client.
///
/// "No result" is not an error: analysis returns `Ok(None)` for it.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine binary could not be spawned (missing, not executable, ...)
    #[error("failed to launch engine {}: {source}", path.display())]
    LaunchFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing a command failed, usually because the process went away
    #[error("failed to write {command:?} to engine: {source}")]
    WriteFailure {
        command: String,
        #[source]
        source: io::Error,
    },

    /// Handshake acknowledgements did not arrive in time
    #[error("engine did not answer the handshake within {waited:?}")]
    Timeout { waited: Duration },
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Rejected game-session moves
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoveError {
    #[error("illegal move {from}{to}")]
    Illegal { from: Square, to: Square },

    #[error("unsupported move notation {0:?}")]
    BadNotation(String),
}

/// Configuration loading failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O error for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no engine binary configured and {0:?} was not found on PATH")]
    EngineNotFound(String),
}
