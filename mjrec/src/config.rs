//! Configuration for the recording host.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use mjrec_core::{ImageQuality, PatternSource, PixelFormat, RateSpan, RecorderOptions};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MjrecConfig {
    /// Recorder options.
    pub recorder: RecorderSection,
    /// Synthetic capture source.
    pub source: SourceConfig,
    /// Where and for how long to record.
    pub output: OutputConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Recorder options, in the shape a host config file uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderSection {
    /// Output format: "image/jpeg" or "image/webp".
    pub mime_type: String,
    /// Target bitrate cap in bits per second.
    pub bits_per_second: i64,
    /// Drop consecutive frames whose content did not change.
    pub prune_consecutive_equal_frames: bool,
    /// Bitrate lookback window in milliseconds.
    pub lookback_ms: u64,
    /// Rate divisor: "elapsed" or "window".
    pub rate_span: RateSpan,
    /// Periodic capture interval in milliseconds (0 = manual only).
    pub timeslice_ms: u64,
    pub quality: ImageQuality,
}

/// Synthetic capture source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub width: u32,
    pub height: u32,
    /// Nominal frames per second.
    pub fps: f64,
    /// Move the test pattern every N draws (0 = static scene).
    pub motion_every: u32,
    /// Render 4-byte RGBA instead of RGB.
    pub alpha: bool,
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving frame files and `manifest.jsonl`.
    pub directory: PathBuf,
    /// Recording length in seconds (0 = until Ctrl-C).
    pub duration_secs: u64,
    /// Pause this many seconds after start (0 = never).
    pub pause_after_secs: u64,
    /// How long a scheduled pause lasts.
    pub pause_for_secs: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for RecorderSection {
    fn default() -> Self {
        Self {
            mime_type: "image/jpeg".into(),
            bits_per_second: mjrec_core::DEFAULT_TARGET_BPS as i64,
            prune_consecutive_equal_frames: true,
            lookback_ms: 1000,
            rate_span: RateSpan::default(),
            timeslice_ms: 100,
            quality: ImageQuality::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            fps: 15.0,
            motion_every: 4,
            alpha: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("recording"),
            duration_secs: 10,
            pause_after_secs: 0,
            pause_for_secs: 2,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl MjrecConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// The default configuration rendered as TOML.
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&Self::default())
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = Self::default_toml().map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }
}

impl RecorderSection {
    /// Convert into the option bag the recorder validates.
    pub fn to_options(&self) -> RecorderOptions {
        RecorderOptions {
            mime_type: Some(self.mime_type.clone()),
            bits_per_second: Some(self.bits_per_second as f64),
            prune_consecutive_equal_frames: self.prune_consecutive_equal_frames,
            lookback_time: Some(self.lookback_ms as f64),
            rate_span: self.rate_span,
            image_quality: Some(self.quality),
            ..Default::default()
        }
    }

    pub fn timeslice(&self) -> Option<Duration> {
        (self.timeslice_ms > 0).then(|| Duration::from_millis(self.timeslice_ms))
    }
}

impl SourceConfig {
    pub fn pattern(&self) -> PatternSource {
        let format = if self.alpha {
            PixelFormat::Rgba8
        } else {
            PixelFormat::Rgb8
        };
        PatternSource::new(self.width, self.height, self.fps)
            .with_motion_every(self.motion_every)
            .with_format(format)
    }
}

impl OutputConfig {
    pub fn duration(&self) -> Option<Duration> {
        (self.duration_secs > 0).then(|| Duration::from_secs(self.duration_secs))
    }

    /// Offset from start and length of the scheduled pause, if any.
    pub fn pause_window(&self) -> Option<(Duration, Duration)> {
        (self.pause_after_secs > 0).then(|| {
            (
                Duration::from_secs(self.pause_after_secs),
                Duration::from_secs(self.pause_for_secs),
            )
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────
