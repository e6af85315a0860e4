//! Recorder options and their validated form.
//!
//! [`RecorderOptions`] mirrors the option bag a caller hands to the
//! recorder; every field is optional. [`RecorderConfig`] is the resolved,
//! per-instance copy the driver actually runs with.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::admission::AdmissionController;
use crate::error::RecorderError;
use crate::estimator::{BitrateEstimator, DEFAULT_LOOKBACK, RateSpan};
use crate::mime::MimeType;

/// Target bitrate used when neither bitrate option is positive.
pub const DEFAULT_TARGET_BPS: u64 = 250_000;

// ── ImageQuality ─────────────────────────────────────────────────

/// Encoder quality parameters, each in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageQuality {
    /// Quality used for emitted frames.
    pub current: f32,
    pub max: f32,
    /// Quality used for duplicate-detection fingerprints.
    pub min: f32,
}

impl Default for ImageQuality {
    fn default() -> Self {
        Self {
            current: 0.7,
            max: 0.9,
            min: 0.3,
        }
    }
}

impl ImageQuality {
    fn validate(&self) -> Result<(), RecorderError> {
        let in_unit = |q: f32| (0.0..=1.0).contains(&q);
        if !(in_unit(self.min) && in_unit(self.max) && in_unit(self.current)) {
            return Err(RecorderError::InvalidConfig(
                "image quality values must lie in 0.0..=1.0".into(),
            ));
        }
        if self.min > self.max || self.current < self.min || self.current > self.max {
            return Err(RecorderError::InvalidConfig(
                "image quality must satisfy min <= current <= max".into(),
            ));
        }
        Ok(())
    }
}

// ── RecorderOptions ──────────────────────────────────────────────

/// Caller-supplied options. Unset fields take defaults.
///
/// Numeric options accept any JSON number. Bitrates are floored to whole
/// bits per second, and anything below 1 means the default. A
/// non-positive lookback leaves the window empty, which disables the
/// bitrate cap.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecorderOptions {
    /// Output format; must pass [`MimeType::is_type_supported`].
    #[serde(alias = "mime_type")]
    pub mime_type: Option<String>,
    #[serde(alias = "video_bits_per_second")]
    pub video_bits_per_second: Option<f64>,
    #[serde(alias = "bits_per_second")]
    pub bits_per_second: Option<f64>,
    /// Suppress consecutive frames with unchanged content.
    #[serde(alias = "prune_consecutive_equal_frames")]
    pub prune_consecutive_equal_frames: bool,
    /// Lookback window in milliseconds.
    #[serde(alias = "lookback_time")]
    pub lookback_time: Option<f64>,
    #[serde(alias = "rate_span")]
    pub rate_span: RateSpan,
    #[serde(alias = "image_quality")]
    pub image_quality: Option<ImageQuality>,
}

// ── RecorderConfig ───────────────────────────────────────────────

/// Validated recorder configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderConfig {
    pub mime_type: MimeType,
    pub target_bps: u64,
    pub prune_duplicates: bool,
    pub lookback: Duration,
    pub rate_span: RateSpan,
    pub quality: ImageQuality,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            mime_type: MimeType::default(),
            target_bps: DEFAULT_TARGET_BPS,
            prune_duplicates: false,
            lookback: DEFAULT_LOOKBACK,
            rate_span: RateSpan::default(),
            quality: ImageQuality::default(),
        }
    }
}

impl RecorderConfig {
    /// Resolve `options`, failing on an unsupported mime type or an
    /// out-of-range value.
    pub fn from_options(options: &RecorderOptions) -> Result<Self, RecorderError> {
        let mime_type = match &options.mime_type {
            Some(m) => m.parse()?,
            None => MimeType::default(),
        };

        // The larger of the two bitrate options wins.
        let requested = options
            .video_bits_per_second
            .unwrap_or(0.0)
            .max(options.bits_per_second.unwrap_or(0.0))
            .floor();
        let target_bps = if requested >= 1.0 {
            requested as u64
        } else {
            DEFAULT_TARGET_BPS
        };

        let lookback = match options.lookback_time {
            Some(ms) => Duration::try_from_secs_f64(ms.max(0.0) / 1000.0).map_err(|e| {
                RecorderError::InvalidConfig(format!("lookbackTime {ms} out of range: {e}"))
            })?,
            None => DEFAULT_LOOKBACK,
        };

        let quality = options.image_quality.unwrap_or_default();
        quality.validate()?;

        Ok(Self {
            mime_type,
            target_bps,
            prune_duplicates: options.prune_consecutive_equal_frames,
            lookback,
            rate_span: options.rate_span,
            quality,
        })
    }

    pub fn estimator(&self) -> BitrateEstimator {
        BitrateEstimator::with_window(self.lookback).with_span(self.rate_span)
    }

    /// A fresh controller with empty history.
    pub fn admission_controller(&self) -> AdmissionController {
        AdmissionController::new(self.estimator(), self.target_bps, self.prune_duplicates)
    }
}

// ── Tests ────────────────────────────────────────────────────────
