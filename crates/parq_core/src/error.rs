//! Engine Error Types

use thiserror::Error;

/// Errors that can occur while configuring or controlling the engine
///
/// Block processing never fails; these come from construction, `prepare`,
/// band lookups and state persistence.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Band count must be between 1 and {max}, got {got}")]
    InvalidBandCount { got: usize, max: usize },

    #[error("Invalid band index: {index} (engine has {count} bands)")]
    InvalidBandIndex { index: usize, count: usize },

    #[error("Stream configuration error: {0}")]
    ConfigError(String),

    #[error("DSP error: {0}")]
    DspError(#[from] parq_dsp::DspError),

    #[error("State file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
