//! Sliding-window bitrate estimator.
//!
//! Trims the admission [`History`] to the trailing lookback window and
//! computes the bitrate the stream *would* have if a candidate frame were
//! admitted now. The admission controller compares that forward-looking
//! figure against the target cap, so a frame that would overshoot is
//! never sent.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::history::{History, Sample};

/// Default lookback window: one second.
pub const DEFAULT_LOOKBACK: Duration = Duration::from_millis(1000);

/// Converts bytes per millisecond into bits per second.
const BITS_PER_BYTE_MS: f64 = 8000.0;

// ── RateSpan ─────────────────────────────────────────────────────

/// The time span the byte sum is divided by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateSpan {
    /// Time from the oldest retained sample to now.
    #[default]
    Elapsed,
    /// The full lookback window, regardless of how much of it is filled.
    Window,
}

// ── Estimate ─────────────────────────────────────────────────────

/// Result of one estimation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Estimate {
    /// History was empty after trimming; there is no rate signal yet.
    NoSignal,
    /// The oldest retained sample is not strictly older than `now`, so no
    /// meaningful rate can be computed this cycle.
    Degenerate,
    /// Estimated bits/second with the candidate included.
    Rate {
        bits_per_second: f64,
        /// Divisor used, in milliseconds.
        span_ms: u64,
        /// Candidate bytes plus every retained sample's bytes.
        byte_sum: u64,
    },
}

impl Estimate {
    /// Whether this estimate exceeds `target_bps`. Missing signals never do.
    pub fn exceeds(&self, target_bps: u64) -> bool {
        match self {
            Estimate::Rate {
                bits_per_second, ..
            } => *bits_per_second > target_bps as f64,
            Estimate::NoSignal | Estimate::Degenerate => false,
        }
    }

    /// Estimated bits/second, if one was computed.
    pub fn bits_per_second(&self) -> Option<f64> {
        match self {
            Estimate::Rate {
                bits_per_second, ..
            } => Some(*bits_per_second),
            _ => None,
        }
    }
}

// ── BitrateEstimator ─────────────────────────────────────────────

/// Trailing-window bitrate estimator.
///
/// Holds only the window parameters; the samples live in the caller's
/// [`History`] so the admission controller stays their sole owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitrateEstimator {
    window_ms: u64,
    span: RateSpan,
}

impl BitrateEstimator {
    /// Create an estimator with a 1-second window.
    pub fn new() -> Self {
        Self::with_window(DEFAULT_LOOKBACK)
    }

    /// Create an estimator with a custom window duration.
    pub fn with_window(window: Duration) -> Self {
        Self {
            window_ms: window.as_millis() as u64,
            span: RateSpan::default(),
        }
    }

    /// Select which span the byte sum is divided by.
    pub fn with_span(mut self, span: RateSpan) -> Self {
        self.span = span;
        self
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn span(&self) -> RateSpan {
        self.span
    }

    /// Evict samples whose timestamp is `<= now - window`.
    ///
    /// Returns the number of samples removed.
    pub fn trim(&self, history: &mut History<Sample>, now_ms: u64) -> usize {
        let mut evicted = 0;
        while let Some(oldest) = history.peek_oldest() {
            if oldest.timestamp_ms.saturating_add(self.window_ms) <= now_ms {
                history.dequeue_oldest();
                evicted += 1;
            } else {
                break;
            }
        }
        evicted
    }

    /// Trim `history` to the window ending at `candidate.timestamp_ms` and
    /// estimate the bitrate with `candidate` included.
    ///
    /// The candidate itself is not enqueued.
    pub fn estimate(&self, history: &mut History<Sample>, candidate: Sample) -> Estimate {
        let now_ms = candidate.timestamp_ms;
        self.trim(history, now_ms);

        let Some(oldest) = history.peek_oldest() else {
            return Estimate::NoSignal;
        };

        let span_ms = match self.span {
            RateSpan::Elapsed => now_ms.saturating_sub(oldest.timestamp_ms),
            RateSpan::Window => self.window_ms,
        };
        if span_ms == 0 {
            return Estimate::Degenerate;
        }

        let byte_sum = candidate.size_bytes + history.total_bytes();
        Estimate::Rate {
            bits_per_second: BITS_PER_BYTE_MS * byte_sum as f64 / span_ms as f64,
            span_ms,
            byte_sum,
        }
    }
}

impl Default for BitrateEstimator {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
