//! Domain-specific error types for the recorder.
//!
//! All fallible operations return `Result<T, RecorderError>`.
//! Invalid lifecycle transitions are *not* returned to callers directly;
//! the capture driver wraps them in an `error` event instead.

use thiserror::Error;

use crate::state::Operation;

/// The canonical error type for the recorder.
#[derive(Debug, Error)]
pub enum RecorderError {
    // ── Configuration Errors ─────────────────────────────────────
    /// The requested output format is not one the recorder can produce.
    #[error("NotSupportedError: mimeType {0} unknown")]
    UnsupportedMimeType(String),

    /// A configuration value is outside its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Lifecycle Errors ─────────────────────────────────────────
    /// An operation was attempted in a state that forbids it.
    #[error("wrong state for {operation}")]
    InvalidState { operation: Operation },

    // ── Pipeline Errors ──────────────────────────────────────────
    /// The capture source could not report its geometry.
    #[error("capture source unavailable: {0}")]
    SourceUnavailable(String),

    /// Drawing the current frame to the raster surface failed.
    #[error("draw failed: {0}")]
    Draw(String),

    /// Encoding the raster to a compressed blob failed.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Producing the low-fidelity comparison fingerprint failed.
    #[error("fingerprint failed: {0}")]
    Fingerprint(String),

    // ── Runtime Errors ───────────────────────────────────────────
    /// The recorder task has shut down and no longer accepts commands.
    #[error("recorder channel closed")]
    ChannelClosed,

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl RecorderError {
    /// Returns `true` for the invalid-state-transition class of error.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, RecorderError::InvalidState { .. })
    }

    /// Returns `true` for draw, encode and fingerprint failures, which
    /// leave the recorder usable for the next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RecorderError::Draw(_) | RecorderError::Encode(_) | RecorderError::Fingerprint(_)
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for RecorderError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        RecorderError::ChannelClosed
    }
}
