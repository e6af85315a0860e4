//! Reference per-frame encoder: quantize, then zstd.
//!
//! Each blob is self-contained, so frames can be decoded in any order:
//!
//! ```text
//! magic:   [u8; 4]  "MJRF"
//! width:   u32 LE
//! height:  u32 LE
//! bpp:     u8
//! shift:   u8       low bits dropped from every channel
//! body:    zstd(tightly packed, quantized pixel rows)
//! ```
//!
//! Quality maps to both the quantization shift (lossy) and the zstd level,
//! so lower quality gives smaller blobs and a coarser fingerprint.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};

use crate::error::RecorderError;
use crate::mime::MimeType;
use crate::source::{FrameEncoder, PixelFormat, RasterFrame};

const MAGIC: &[u8; 4] = b"MJRF";
const HEADER_LEN: usize = 14;
/// Largest number of low bits dropped per channel (quality 0.0).
const MAX_SHIFT: f32 = 6.0;

/// Quantizing zstd encoder.
#[derive(Debug, Clone, Default)]
pub struct ZstdFrameEncoder;

impl ZstdFrameEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Bits dropped per channel at `quality`.
    pub fn quantization_shift(quality: f32) -> u8 {
        ((1.0 - quality.clamp(0.0, 1.0)) * MAX_SHIFT).round() as u8
    }

    /// zstd level at `quality`: 1 (fast) .. 9.
    pub fn compression_level(quality: f32) -> i32 {
        1 + (quality.clamp(0.0, 1.0) * 8.0).round() as i32
    }

    /// Encode synchronously.
    pub fn encode_frame(&self, frame: &RasterFrame, quality: f32) -> Result<Bytes, RecorderError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(RecorderError::Encode(format!(
                "zero-sized frame {}x{}",
                frame.width, frame.height
            )));
        }
        let bpp = frame.format.bytes_per_pixel();
        let row_len = frame.width as usize * bpp;
        if (frame.stride as usize) < row_len || frame.data.len() < frame.byte_len() {
            return Err(RecorderError::Encode("raster buffer shorter than geometry".into()));
        }

        let shift = Self::quantization_shift(quality);
        let mask = 0xFFu8 << shift;
        let mut packed = Vec::with_capacity(row_len * frame.height as usize);
        for y in 0..frame.height {
            packed.extend(frame.row(y).iter().map(|b| b & mask));
        }

        let body = zstd::encode_all(packed.as_slice(), Self::compression_level(quality))
            .map_err(|e| RecorderError::Encode(format!("zstd encode failed: {e}")))?;

        let mut out = BytesMut::with_capacity(HEADER_LEN + body.len());
        out.put_slice(MAGIC);
        out.put_u32_le(frame.width);
        out.put_u32_le(frame.height);
        out.put_u8(bpp as u8);
        out.put_u8(shift);
        out.put_slice(&body);
        Ok(out.freeze())
    }

    /// Decode a blob produced by [`encode_frame`](Self::encode_frame).
    pub fn decode(blob: &[u8]) -> Result<RasterFrame, RecorderError> {
        if blob.len() < HEADER_LEN || &blob[..4] != MAGIC {
            return Err(RecorderError::Other("not an MJRF blob".into()));
        }
        let width = u32::from_le_bytes([blob[4], blob[5], blob[6], blob[7]]);
        let height = u32::from_le_bytes([blob[8], blob[9], blob[10], blob[11]]);
        let format = match blob[12] {
            3 => PixelFormat::Rgb8,
            4 => PixelFormat::Rgba8,
            other => return Err(RecorderError::Other(format!("unknown pixel size {other}"))),
        };
        let stride = width
            .checked_mul(format.bytes_per_pixel() as u32)
            .ok_or_else(|| RecorderError::Other("frame width overflows stride".into()))?;
        let expected = (stride as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| RecorderError::Other("frame dimensions overflow".into()))?;
        let data = zstd::decode_all(&blob[HEADER_LEN..])
            .map_err(|e| RecorderError::Other(format!("zstd decode failed: {e}")))?;
        if data.len() != expected {
            return Err(RecorderError::Other("decoded length does not match header".into()));
        }
        Ok(RasterFrame {
            width,
            height,
            stride,
            format,
            data,
            timestamp: std::time::Instant::now(),
        })
    }
}

#[async_trait]
impl FrameEncoder for ZstdFrameEncoder {
    async fn encode(
        &self,
        frame: &RasterFrame,
        _mime_type: MimeType,
        quality: f32,
    ) -> Result<Option<Bytes>, RecorderError> {
        self.encode_frame(frame, quality).map(Some)
    }

    fn fingerprint(
        &self,
        frame: &RasterFrame,
        _mime_type: MimeType,
        quality: f32,
    ) -> Result<Vec<u8>, RecorderError> {
        self.encode_frame(frame, quality)
            .map(|b| b.to_vec())
            .map_err(|e| RecorderError::Fingerprint(e.to_string()))
    }
}

// ── Tests ────────────────────────────────────────────────────────
