//! # mjrec: still-image recording host
//!
//! Runs a [`mjrec_core::Recorder`] over the synthetic test-pattern source
//! and writes every emitted frame to disk, with a `manifest.jsonl` index
//! alongside.
//!
//! ## Modes
//!
//! - **Timed**: record for `output.duration_secs`, then stop.
//! - **Open-ended**: with a zero duration, record until Ctrl-C.
//! - **Pause schedule**: optionally pause and resume part-way through.

pub mod config;
pub mod session;
