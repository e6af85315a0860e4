//! Recorder lifecycle state machine.
//!
//! Provides a `RecordingState` enum that models the recorder lifecycle,
//! with validated transitions that return `Result` instead of panicking.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RecorderError;

// ── Operation ────────────────────────────────────────────────────

/// A caller-visible recorder operation.
///
/// Carried by invalid-state errors so the caller can tell which call was
/// rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Start,
    Stop,
    Pause,
    Resume,
    RequestData,
    /// A cycle fired by the periodic timer rather than by a caller.
    Tick,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::RequestData => "requestData",
            Self::Tick => "tick",
        };
        f.write_str(name)
    }
}

// ── RecordingState ───────────────────────────────────────────────

/// The current state of the recording process.
///
/// ```text
///  Inactive ──start──► Recording ──pause──► Paused
///     ▲                  │   ▲                │
///     │                  │   └────resume──────┘
///     └──────stop────────┴────────stop────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// Not recording. Initial state.
    #[default]
    Inactive,
    /// Capturing frames; periodic cycles fire.
    Recording,
    /// Capture suspended; manual cycles are still allowed.
    Paused,
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "inactive"),
            Self::Recording => write!(f, "recording"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

impl RecordingState {
    pub fn is_inactive(&self) -> bool {
        matches!(self, Self::Inactive)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Recording`.
    ///
    /// Valid from: `Inactive`.
    pub fn start(&mut self) -> Result<(), RecorderError> {
        match self {
            Self::Inactive => {
                *self = Self::Recording;
                Ok(())
            }
            _ => Err(Self::rejected(Operation::Start)),
        }
    }

    /// Transition to `Inactive`.
    ///
    /// Valid from: `Recording`, `Paused`.
    pub fn stop(&mut self) -> Result<(), RecorderError> {
        match self {
            Self::Recording | Self::Paused => {
                *self = Self::Inactive;
                Ok(())
            }
            Self::Inactive => Err(Self::rejected(Operation::Stop)),
        }
    }

    /// Transition to `Paused`.
    ///
    /// Valid from: `Recording`.
    pub fn pause(&mut self) -> Result<(), RecorderError> {
        match self {
            Self::Recording => {
                *self = Self::Paused;
                Ok(())
            }
            _ => Err(Self::rejected(Operation::Pause)),
        }
    }

    /// Transition back to `Recording`.
    ///
    /// Valid from: `Paused`.
    pub fn resume(&mut self) -> Result<(), RecorderError> {
        match self {
            Self::Paused => {
                *self = Self::Recording;
                Ok(())
            }
            _ => Err(Self::rejected(Operation::Resume)),
        }
    }

    /// Check that a manual capture cycle is allowed. Does not change state.
    pub fn check_request_data(&self) -> Result<(), RecorderError> {
        match self {
            Self::Inactive => Err(Self::rejected(Operation::RequestData)),
            Self::Recording | Self::Paused => Ok(()),
        }
    }

    fn rejected(operation: Operation) -> RecorderError {
        RecorderError::InvalidState { operation }
    }
}

// ── Tests ────────────────────────────────────────────────────────
