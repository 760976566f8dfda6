//! Frame container and pixel geometry.
//!
//! - `Frame`: one decoded RGB24 video frame plus its stream-local index.
//! - `Rect`: pixel-space box in corner form, as emitted by the detector.
//! - Crop, luminance and JPEG helpers used by the capture trigger and the
//!   recognition stages.
//!
//! Frames live for exactly one pipeline step. The only frame that outlives its
//! step is the fired frame, which is moved into the recognition runner.

use anyhow::{anyhow, Context, Result};
use std::io::Write;

/// Bytes per RGB24 pixel.
pub const RGB_CHANNELS: usize = 3;

/// One decoded video frame.
///
/// Pixel data is tightly packed RGB24, row-major, without padding.
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonically increasing per stream, starting at 1.
    pub index: u64,
}

impl Frame {
    /// Wrap decoded pixels. Fails when the buffer does not match the dimensions.
    pub fn new(index: u64, data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(RGB_CHANNELS))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected_len,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            index,
        })
    }

    /// Uniform frame filled with one RGB value.
    pub fn filled(index: u64, width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * RGB_CHANNELS)
            .collect();
        Self {
            data,
            width,
            height,
            index,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Paint a solid rectangle. Coordinates are clamped to the frame.
    pub fn fill_rect(&mut self, rect: Rect, rgb: [u8; 3]) {
        let Some((x0, y0, x1, y1)) = rect.clamp_to(self.width, self.height) else {
            return;
        };
        let width = self.width as usize;
        for y in y0..y1 {
            for x in x0..x1 {
                let idx = (y * width + x) * RGB_CHANNELS;
                self.data[idx..idx + RGB_CHANNELS].copy_from_slice(&rgb);
            }
        }
    }

    /// Per-pixel luminance (BT.601 integer weights).
    pub fn luminance(&self) -> Vec<u8> {
        self.data
            .chunks_exact(RGB_CHANNELS)
            .map(|px| {
                let y = 299 * px[0] as u32 + 587 * px[1] as u32 + 114 * px[2] as u32;
                (y / 1000) as u8
            })
            .collect()
    }

    /// Copy out the region under `rect`. Fails when the box lies outside the frame.
    pub fn crop(&self, rect: Rect) -> Result<Frame> {
        let (x0, y0, x1, y1) = rect.clamp_to(self.width, self.height).ok_or_else(|| {
            anyhow!(
                "crop box {:?} lies outside {}x{} frame",
                rect,
                self.width,
                self.height
            )
        })?;
        let width = self.width as usize;
        let mut data = Vec::with_capacity((x1 - x0) * (y1 - y0) * RGB_CHANNELS);
        for y in y0..y1 {
            let start = (y * width + x0) * RGB_CHANNELS;
            let end = (y * width + x1) * RGB_CHANNELS;
            data.extend_from_slice(&self.data[start..end]);
        }
        Frame::new(self.index, data, (x1 - x0) as u32, (y1 - y0) as u32)
    }

    /// Encode as JPEG into `out`.
    pub fn write_jpeg<W: Write>(&self, out: &mut W) -> Result<()> {
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(out, 95);
        encoder
            .encode(
                &self.data,
                self.width,
                self.height,
                image::ExtendedColorType::Rgb8,
            )
            .context("jpeg encode")?;
        Ok(())
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Axis-aligned box in pixel coordinates (corner form).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Rect {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from a centre point and size, the layout YOLO heads emit.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            x1: self.x1 * sx,
            y1: self.y1 * sy,
            x2: self.x2 * sx,
            y2: self.y2 * sy,
        }
    }

    /// Integer pixel bounds `[x0, x1) x [y0, y1)` inside a `width x height`
    /// frame, or `None` when nothing of the box remains.
    fn clamp_to(&self, width: u32, height: u32) -> Option<(usize, usize, usize, usize)> {
        let clamp = |v: f32, max: u32| v.round().clamp(0.0, max as f32) as usize;
        let x0 = clamp(self.x1, width);
        let y0 = clamp(self.y1, height);
        let x1 = clamp(self.x2, width);
        let y1 = clamp(self.y2, height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1, y1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_mismatched_buffer() {
        assert!(Frame::new(1, vec![0u8; 10], 4, 4).is_err());
        assert!(Frame::new(1, vec![0u8; 48], 4, 4).is_ok());
    }

    #[test]
    fn crop_clamps_to_frame_bounds() {
        let mut frame = Frame::filled(7, 20, 10, [10, 20, 30]);
        frame.fill_rect(Rect::new(15.0, 5.0, 40.0, 40.0), [255, 0, 0]);

        let crop = frame.crop(Rect::new(15.0, 5.0, 40.0, 40.0)).unwrap();
        assert_eq!(crop.width, 5);
        assert_eq!(crop.height, 5);
        assert_eq!(crop.index, 7);
        assert!(crop.pixels().chunks(3).all(|px| px == [255, 0, 0]));
    }

    #[test]
    fn crop_outside_frame_fails() {
        let frame = Frame::filled(1, 10, 10, [0, 0, 0]);
        assert!(frame.crop(Rect::new(20.0, 20.0, 30.0, 30.0)).is_err());
        assert!(frame.crop(Rect::new(5.0, 5.0, 5.0, 8.0)).is_err());
    }

    #[test]
    fn luminance_uses_bt601_weights() {
        let frame = Frame::filled(1, 2, 1, [255, 255, 255]);
        assert_eq!(frame.luminance(), vec![255, 255]);
        let frame = Frame::filled(1, 1, 1, [255, 0, 0]);
        assert_eq!(frame.luminance(), vec![76]);
    }

    #[test]
    fn jpeg_encoding_produces_soi_marker() {
        let frame = Frame::filled(1, 8, 8, [128, 64, 32]);
        let mut out = Vec::new();
        frame.write_jpeg(&mut out).unwrap();
        assert_eq!(&out[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn rect_from_center_round_trips_size() {
        let rect = Rect::from_center(50.0, 40.0, 20.0, 10.0);
        assert_eq!(rect, Rect::new(40.0, 35.0, 60.0, 45.0));
        assert_eq!(rect.area(), 200.0);
    }
}
