//! Synthetic capture source.
//!
//! Renders a gradient background with a vertical bar that moves every
//! `motion_every` draws. With `motion_every == 0` the scene is static and
//! every draw yields identical pixels, which is what the duplicate filter
//! is meant to catch.

use std::time::Instant;

use crate::error::RecorderError;
use crate::source::{FrameGeometry, FrameSource, PixelFormat, RasterFrame};

const BAR_WIDTH: u32 = 8;

pub struct PatternSource {
    geometry: FrameGeometry,
    format: PixelFormat,
    motion_every: u32,
    draws: u64,
}

impl PatternSource {
    pub fn new(width: u32, height: u32, frame_rate: f64) -> Self {
        Self {
            geometry: FrameGeometry {
                width,
                height,
                frame_rate,
            },
            format: PixelFormat::Rgb8,
            motion_every: 1,
            draws: 0,
        }
    }

    /// Advance the scene once every `n` draws; `0` freezes it.
    pub fn with_motion_every(mut self, n: u32) -> Self {
        self.motion_every = n;
        self
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    /// Number of frames drawn so far.
    pub fn draws(&self) -> u64 {
        self.draws
    }

    fn phase(&self) -> u64 {
        match self.motion_every {
            0 => 0,
            n => self.draws / n as u64,
        }
    }

    fn render(&self) -> RasterFrame {
        let FrameGeometry { width, height, .. } = self.geometry;
        let mut frame = RasterFrame::filled(width, height, self.format, 0xFF);
        let bar_x = ((self.phase() * BAR_WIDTH as u64) % width.max(1) as u64) as u32;

        for y in 0..height {
            for x in 0..width {
                let on_bar = x >= bar_x && x < bar_x + BAR_WIDTH;
                let base = ((x * 255) / width.max(1)) as u8;
                let shade = ((y * 255) / height.max(1)) as u8;
                let px = frame.pixel_mut(x, y);
                if on_bar {
                    px[..3].copy_from_slice(&[0xF0, 0x20, 0x20]);
                } else {
                    px[..3].copy_from_slice(&[base, shade, base / 2 + shade / 2]);
                }
            }
        }
        frame.timestamp = Instant::now();
        frame
    }
}

impl FrameSource for PatternSource {
    fn geometry(&self) -> Result<FrameGeometry, RecorderError> {
        if self.geometry.width == 0 || self.geometry.height == 0 {
            return Err(RecorderError::SourceUnavailable(
                "pattern has zero-sized geometry".into(),
            ));
        }
        Ok(self.geometry)
    }

    fn draw(&mut self) -> Result<RasterFrame, RecorderError> {
        let frame = self.render();
        self.draws += 1;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_scene_repeats() {
        let mut src = PatternSource::new(32, 8, 30.0).with_motion_every(0);
        let a = src.draw().unwrap();
        let b = src.draw().unwrap();
        assert_eq!(a.data, b.data);
        assert_eq!(src.draws(), 2);
    }

    #[test]
    fn moving_scene_changes() {
        let mut src = PatternSource::new(32, 8, 30.0).with_motion_every(2);
        let a = src.draw().unwrap();
        let b = src.draw().unwrap();
        let c = src.draw().unwrap();
        assert_eq!(a.data, b.data);
        assert_ne!(b.data, c.data);
    }

    #[test]
    fn rgba_keeps_opaque_alpha() {
        let mut src = PatternSource::new(4, 4, 30.0).with_format(PixelFormat::Rgba8);
        let f = src.draw().unwrap();
        assert_eq!(f.pixel(3, 3)[3], 0xFF);
    }

    #[test]
    fn zero_geometry_unavailable() {
        let src = PatternSource::new(0, 0, 30.0);
        assert!(matches!(
            src.geometry(),
            Err(RecorderError::SourceUnavailable(_))
        ));
    }
}
