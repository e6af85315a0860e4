//! Frame admission: the single authority on whether a sampled frame is
//! emitted.
//!
//! Rules are applied in order and the first that applies wins:
//!
//! 1. **Empty**: zero-byte candidates are dropped without touching state.
//! 2. **Bitrate cap**: the [`BitrateEstimator`] is run as if the candidate
//!    were admitted; over-target candidates are suppressed.
//! 3. **Duplicate**: with pruning enabled, a candidate the same size as
//!    the last admitted frame is compared by content digest and, failing
//!    that, by low-fidelity re-encodes of both rasters.
//! 4. **Admit**: the sample is recorded and the duplicate baseline moves
//!    to this frame.
//!
//! Only step 4 (and the window trim inside step 2) mutates state.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::error::RecorderError;
use crate::estimator::{BitrateEstimator, Estimate};
use crate::history::{History, Sample};
use crate::source::RasterFrame;

// ── Fingerprint ──────────────────────────────────────────────────

/// BLAKE3 digest used to compare frame content across cycles.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Digest `bytes`.
    pub fn of(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint(")?;
        for b in &self.0[..6] {
            write!(f, "{b:02x}")?;
        }
        write!(f, "…)")
    }
}

// ── Candidate ────────────────────────────────────────────────────

/// A just-encoded frame awaiting an admission decision.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// When the encode completed, in recorder-clock milliseconds.
    pub timestamp_ms: u64,
    /// Compressed blob.
    pub payload: Bytes,
    /// Raster the blob was encoded from. Without it the low-fidelity
    /// comparison cannot run and same-size frames are admitted.
    pub frame: Option<Arc<RasterFrame>>,
}

impl Candidate {
    pub fn new(timestamp_ms: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            timestamp_ms,
            payload: payload.into(),
            frame: None,
        }
    }

    pub fn with_frame(mut self, frame: Arc<RasterFrame>) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn size_bytes(&self) -> u64 {
        self.payload.len() as u64
    }

    fn sample(&self) -> Sample {
        Sample::new(self.timestamp_ms, self.size_bytes())
    }
}

// ── Decision ─────────────────────────────────────────────────────

/// Why a candidate was not emitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SuppressReason {
    /// Admitting the candidate would push the estimate over the cap.
    Bitrate { bits_per_second: f64, target_bps: u64 },
    /// The candidate repeats the previously admitted frame. `exact` is set
    /// when the compressed bytes matched outright.
    Duplicate { exact: bool },
}

/// Outcome of [`AdmissionController::admit`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Zero-byte candidate; ignored.
    Empty,
    Suppressed(SuppressReason),
    /// Emit the frame. Carries the estimate it was admitted under.
    Admitted { estimate: Estimate },
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }
}

/// What the duplicate filter remembers about the last admitted frame.
#[derive(Debug, Clone)]
struct Baseline {
    size_bytes: u64,
    digest: Fingerprint,
    /// Held only while pruning is enabled.
    frame: Option<Arc<RasterFrame>>,
    /// Fingerprint of `frame`, filled on first comparison.
    low_fidelity: Option<Fingerprint>,
}

impl Baseline {
    fn low_fidelity<F>(&mut self, fingerprint: &mut F) -> Result<Fingerprint, RecorderError>
    where
        F: FnMut(&RasterFrame) -> Result<Fingerprint, RecorderError>,
    {
        if let Some(low) = self.low_fidelity {
            return Ok(low);
        }
        let frame = self
            .frame
            .as_deref()
            .ok_or_else(|| RecorderError::Fingerprint("previous frame has no raster".into()))?;
        let low = fingerprint(frame)?;
        self.low_fidelity = Some(low);
        Ok(low)
    }
}

// ── AdmissionController ──────────────────────────────────────────

/// Owns the admission history and the duplicate-filter baseline.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    estimator: BitrateEstimator,
    history: History<Sample>,
    target_bps: u64,
    prune_duplicates: bool,
    baseline: Option<Baseline>,
    admitted: u64,
    suppressed: u64,
}

impl AdmissionController {
    pub fn new(estimator: BitrateEstimator, target_bps: u64, prune_duplicates: bool) -> Self {
        Self {
            estimator,
            history: History::with_capacity(64),
            target_bps,
            prune_duplicates,
            baseline: None,
            admitted: 0,
            suppressed: 0,
        }
    }

    /// Decide whether `candidate` is emitted.
    ///
    /// `low_fidelity` re-encodes a raster at minimum quality and digests
    /// the result. It runs only when the duplicate filter cannot settle the
    /// question from sizes and digests, at most once per raster: the
    /// previous frame's fingerprint is kept for later comparisons. A
    /// failing fingerprint admits the frame: when unsure, send.
    pub fn admit<F>(&mut self, candidate: &Candidate, mut low_fidelity: F) -> Decision
    where
        F: FnMut(&RasterFrame) -> Result<Fingerprint, RecorderError>,
    {
        let size = candidate.size_bytes();
        if size == 0 {
            trace!("dropping empty frame");
            return Decision::Empty;
        }

        let sample = candidate.sample();
        let estimate = self.estimator.estimate(&mut self.history, sample);
        if estimate.exceeds(self.target_bps) {
            let bits_per_second = estimate.bits_per_second().unwrap_or_default();
            trace!(
                size,
                bits_per_second,
                target = self.target_bps,
                "suppressed frame over bitrate cap"
            );
            self.suppressed += 1;
            return Decision::Suppressed(SuppressReason::Bitrate {
                bits_per_second,
                target_bps: self.target_bps,
            });
        }

        let digest = Fingerprint::of(&candidate.payload);
        let mut fresh_low_fidelity = None;

        if self.prune_duplicates {
            if let Some(base) = self.baseline.as_mut().filter(|b| b.size_bytes == size) {
                if base.digest == digest {
                    debug!(size, "suppressed byte-identical frame");
                    self.suppressed += 1;
                    return Decision::Suppressed(SuppressReason::Duplicate { exact: true });
                }
                let current = candidate
                    .frame
                    .as_deref()
                    .ok_or_else(|| RecorderError::Fingerprint("candidate has no raster".into()))
                    .and_then(|frame| low_fidelity(frame));
                let compared = current.and_then(|low| {
                    base.low_fidelity(&mut low_fidelity)
                        .map(|previous| (previous, low))
                });
                match compared {
                    Ok((previous, low)) if previous == low => {
                        debug!(size, "suppressed unchanged frame");
                        self.suppressed += 1;
                        return Decision::Suppressed(SuppressReason::Duplicate { exact: false });
                    }
                    Ok((_, low)) => fresh_low_fidelity = Some(low),
                    Err(e) => warn!("fingerprint unavailable, admitting frame: {e}"),
                }
            }
        }

        self.history.enqueue(sample);
        self.baseline = Some(Baseline {
            size_bytes: size,
            digest,
            frame: if self.prune_duplicates {
                candidate.frame.clone()
            } else {
                None
            },
            low_fidelity: fresh_low_fidelity,
        });
        self.admitted += 1;
        Decision::Admitted { estimate }
    }

    /// Forget all history and the duplicate baseline.
    pub fn reset(&mut self) {
        self.history.clear();
        self.baseline = None;
    }

    pub fn history(&self) -> &History<Sample> {
        &self.history
    }

    pub fn estimator(&self) -> &BitrateEstimator {
        &self.estimator
    }

    pub fn target_bps(&self) -> u64 {
        self.target_bps
    }

    /// Size of the most recently admitted frame.
    pub fn previous_admitted_size(&self) -> Option<u64> {
        self.baseline.as_ref().map(|b| b.size_bytes)
    }

    /// Low-fidelity fingerprint of the most recently admitted frame, once
    /// it has been computed.
    pub fn low_fidelity_baseline(&self) -> Option<Fingerprint> {
        self.baseline.as_ref().and_then(|b| b.low_fidelity)
    }

    /// Frames admitted since construction.
    pub fn admitted_count(&self) -> u64 {
        self.admitted
    }

    /// Frames suppressed since construction, for either reason.
    pub fn suppressed_count(&self) -> u64 {
        self.suppressed
    }
}

// ── Tests ────────────────────────────────────────────────────────
