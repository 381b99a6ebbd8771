//! Error types for the windowed spectrogram engine.

use thiserror::Error;

use crate::cache::TimeRange;

/// Errors raised by the spectrogram engine.
///
/// Configuration errors are fatal and surface synchronously. Compute errors
/// are recovered by the engine: the affected range stays uncovered and is
/// requested again on a later scheduling pass.
#[derive(Debug, Clone, Error)]
pub enum SpectrogramError {
    /// Options that can never produce a valid analysis
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A compute request did not settle within its deadline
    #[error("Compute request {id} for {range} timed out")]
    ComputeTimeout { id: u64, range: TimeRange },

    /// A compute request failed, either in the kernel or because the
    /// background worker went away
    #[error("Compute request {id} failed: {reason}")]
    ComputeFailure { id: u64, reason: String },

    /// Background execution is not available in this host
    #[error("Background execution unavailable: {0}")]
    ResourceUnavailable(String),

    /// The engine was torn down while the request was in flight
    #[error("Request disposed")]
    Disposed,
}

impl SpectrogramError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SpectrogramError>;
