//! # mjrec-core
//!
//! Records a live video feed as a stream of independently encoded still
//! images, throttled to a target bitrate and optionally de-duplicated.
//!
//! This crate contains:
//! - **Recorder**: `Recorder` handle and the capture driver task behind it
//! - **Lifecycle**: `RecordingState` state machine and `Operation` names
//! - **Admission**: `BitrateEstimator` over a sliding `History` window and
//!   the `AdmissionController` that gates each encoded frame
//! - **Events**: `RecorderEvent` fan-out to `EventStream` subscribers
//! - **Collaborators**: `FrameSource` / `FrameEncoder` traits, plus the
//!   reference `PatternSource` and `ZstdFrameEncoder`
//! - **Error**: `RecorderError`, a `thiserror`-based error type

pub mod admission;
pub mod config;
mod driver;
pub mod encoder;
pub mod error;
pub mod estimator;
pub mod events;
pub mod history;
pub mod mime;
pub mod pattern;
pub mod recorder;
pub mod source;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use admission::{AdmissionController, Candidate, Decision, Fingerprint, SuppressReason};
pub use config::{DEFAULT_TARGET_BPS, ImageQuality, RecorderConfig, RecorderOptions};
pub use driver::RecorderStats;
pub use encoder::ZstdFrameEncoder;
pub use error::RecorderError;
pub use estimator::{BitrateEstimator, DEFAULT_LOOKBACK, Estimate, RateSpan};
pub use events::{BlobEvent, ErrorEvent, EventBus, EventKind, EventStream, RecorderEvent};
pub use history::{History, Sample};
pub use mime::MimeType;
pub use pattern::PatternSource;
pub use recorder::Recorder;
pub use source::{Capabilities, FrameEncoder, FrameGeometry, FrameSource, PixelFormat, RasterFrame};
pub use state::{Operation, RecordingState};
