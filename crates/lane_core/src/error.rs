//! Error types for the battle simulation.

use thiserror::Error;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all battle simulation errors.
///
/// Geometry queries (out-of-bounds cells, unreachable goals) are not errors;
/// they return `None` or `false`. Only setup-time problems and broken
/// snapshots surface here.
#[derive(Debug, Error)]
pub enum GameError {
    /// A tunable or settings value is outside its allowed range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Initial setup (towers, starting units) is inconsistent.
    #[error("Invalid setup: {0}")]
    InvalidSetup(String),

    /// Unit definition id not present in the registry.
    #[error("Unknown unit type: {0}")]
    UnknownUnitType(String),

    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path to the file that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Invalid simulation state (corrupt checkpoint, bad replay).
    #[error("Invalid simulation state: {0}")]
    InvalidState(String),

    /// Two simulations fed the same input diverged.
    #[error("Desync detected at frame {frame}: local hash {local_hash}, remote hash {remote_hash}")]
    DesyncDetected {
        /// Frame where the divergence was observed.
        frame: u32,
        /// Local simulation hash.
        local_hash: u64,
        /// Remote simulation hash.
        remote_hash: u64,
    },
}
