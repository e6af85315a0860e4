//! Capture-side collaborators.
//!
//! The recorder does not acquire video or compress pixels itself. A
//! [`FrameSource`] reports the feed's geometry and rasterizes the current
//! frame on demand; a [`FrameEncoder`] turns a raster into a compressed
//! blob. Both are supplied by the host application.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::RecorderError;
use crate::mime::MimeType;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout for rasterized frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
    /// 3 bytes per pixel: Red, Green, Blue.
    Rgb8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
        }
    }
}

// ── FrameGeometry ────────────────────────────────────────────────

/// Dimensions and nominal rate of the capture feed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    /// Nominal frames per second. Non-positive means unknown.
    pub frame_rate: f64,
}

impl FrameGeometry {
    /// Nominal time between frames, or zero when the rate is unknown.
    pub fn frame_interval(&self) -> Duration {
        if self.frame_rate > 0.0 && self.frame_rate.is_finite() {
            Duration::from_secs_f64(1.0 / self.frame_rate)
        } else {
            Duration::ZERO
        }
    }
}

// ── RasterFrame ──────────────────────────────────────────────────

/// The current frame drawn onto a CPU-side surface.
///
/// The `data` buffer holds `height` rows of `stride` bytes each.
#[derive(Debug, Clone)]
pub struct RasterFrame {
    pub width: u32,
    pub height: u32,
    /// Row pitch in **bytes** (may exceed `width * bpp`).
    pub stride: u32,
    pub format: PixelFormat,
    /// Raw pixel data: `stride * height` bytes.
    pub data: Vec<u8>,
    /// When the frame was drawn.
    pub timestamp: Instant,
}

impl RasterFrame {
    /// Tightly packed frame (`stride == width * bpp`) filled with `fill`.
    pub fn filled(width: u32, height: u32, format: PixelFormat, fill: u8) -> Self {
        let stride = width * format.bytes_per_pixel() as u32;
        Self {
            width,
            height,
            stride,
            format,
            data: vec![fill; stride as usize * height as usize],
            timestamp: Instant::now(),
        }
    }

    /// Total byte size the raster occupies.
    pub fn byte_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    /// Pixel bytes of row `y`, excluding padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride as usize;
        let len = self.width as usize * self.format.bytes_per_pixel();
        &self.data[start..start + len]
    }

    /// Pixel bytes at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.format.bytes_per_pixel();
        let offset = y as usize * self.stride as usize + x as usize * bpp;
        &self.data[offset..offset + bpp]
    }

    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let bpp = self.format.bytes_per_pixel();
        let offset = y as usize * self.stride as usize + x as usize * bpp;
        &mut self.data[offset..offset + bpp]
    }
}

// ── Traits ───────────────────────────────────────────────────────

/// A live video feed that can be sampled.
pub trait FrameSource: Send + 'static {
    /// Geometry of the feed. Called once per `start`.
    fn geometry(&self) -> Result<FrameGeometry, RecorderError>;

    /// Draw the current frame. Errors here are transient: the cycle is
    /// abandoned and the recorder stays usable.
    fn draw(&mut self) -> Result<RasterFrame, RecorderError>;
}

/// Independent per-frame compression.
#[async_trait]
pub trait FrameEncoder: Send + Sync + 'static {
    /// Compress `frame` at `quality` (`0.0..=1.0`).
    ///
    /// `Ok(None)` means the encoder produced no output for this frame.
    async fn encode(
        &self,
        frame: &RasterFrame,
        mime_type: MimeType,
        quality: f32,
    ) -> Result<Option<Bytes>, RecorderError>;

    /// Low-fidelity rendering of `frame` used only for content comparison.
    /// Two frames with the same visible content must yield equal bytes.
    fn fingerprint(
        &self,
        frame: &RasterFrame,
        mime_type: MimeType,
        quality: f32,
    ) -> Result<Vec<u8>, RecorderError>;
}

// ── Capabilities ─────────────────────────────────────────────────

/// What the host environment offers. Supplied by the host rather than
/// probed, so the same binary behaves predictably under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// The platform exposes media-capture primitives at all.
    pub media_capture: bool,
}

impl Capabilities {
    pub const fn new(media_capture: bool) -> Self {
        Self { media_capture }
    }

    /// `true` when recording cannot work in this environment.
    pub const fn not_supported(&self) -> bool {
        !self.media_capture
    }
}

// ── Tests ────────────────────────────────────────────────────────
