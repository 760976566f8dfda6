//! Background subtraction and foreground region extraction.
//!
//! `BackgroundModel` keeps one running Gaussian per pixel over luminance
//! (mean and variance, learning rate `1 / min(frames, history)`), the
//! single-mode core of the usual adaptive mixture subtractor. A pixel is
//! foreground when its squared distance from the mean exceeds
//! `var_threshold` times the variance.
//!
//! `ForegroundMask` binarizes the subtractor output and finds 8-connected
//! regions; the largest region stands in for the largest external contour.

/// Initial per-pixel variance (15 grey levels squared).
const VAR_INIT: f32 = 225.0;
const VAR_MIN: f32 = 4.0;
const VAR_MAX: f32 = 5625.0;

/// Mask value written for foreground pixels.
pub const FOREGROUND: u8 = 255;

pub const DEFAULT_HISTORY: u32 = 500;
pub const DEFAULT_VAR_THRESHOLD: f32 = 16.0;

/// Running per-pixel background estimate for one stream.
#[derive(Clone, Debug)]
pub struct BackgroundModel {
    mean: Vec<f32>,
    var: Vec<f32>,
    width: u32,
    height: u32,
    frames_seen: u64,
    history: u32,
    var_threshold: f32,
}

impl BackgroundModel {
    pub fn new(history: u32, var_threshold: f32) -> Self {
        Self {
            mean: Vec::new(),
            var: Vec::new(),
            width: 0,
            height: 0,
            frames_seen: 0,
            history: history.max(1),
            var_threshold,
        }
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Forget everything learned so far.
    pub fn reset(&mut self) {
        self.mean.clear();
        self.var.clear();
        self.width = 0;
        self.height = 0;
        self.frames_seen = 0;
    }

    /// Classify `luma` against the current model, then fold it into the model.
    ///
    /// The first frame (or the first after a resolution change) only seeds
    /// the model and yields an all-background mask.
    pub fn apply(&mut self, luma: &[u8], width: u32, height: u32) -> ForegroundMask {
        let mut mask = ForegroundMask::empty(width, height);
        if width != self.width || height != self.height || self.mean.len() != luma.len() {
            if self.frames_seen > 0 {
                log::debug!(
                    "background model resized {}x{} -> {}x{}",
                    self.width,
                    self.height,
                    width,
                    height
                );
            }
            self.mean = luma.iter().map(|&p| p as f32).collect();
            self.var = vec![VAR_INIT; luma.len()];
            self.width = width;
            self.height = height;
            self.frames_seen = 1;
            return mask;
        }

        self.frames_seen += 1;
        let alpha = 1.0 / self.frames_seen.min(self.history as u64) as f32;
        for (i, &p) in luma.iter().enumerate() {
            let diff = p as f32 - self.mean[i];
            let dist2 = diff * diff;
            if dist2 > self.var_threshold * self.var[i] {
                mask.data[i] = FOREGROUND;
            }
            self.mean[i] += alpha * diff;
            self.var[i] = (self.var[i] + alpha * (dist2 - self.var[i])).clamp(VAR_MIN, VAR_MAX);
        }
        mask
    }
}

impl Default for BackgroundModel {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY, DEFAULT_VAR_THRESHOLD)
    }
}

/// Single-channel mask, one byte per pixel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForegroundMask {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// One 8-connected foreground region. Bounds are inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub pixel_count: u64,
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Region {
    /// Bounding-box area in square pixels.
    pub fn bounding_area(&self) -> u64 {
        (self.x1 - self.x0 + 1) as u64 * (self.y1 - self.y0 + 1) as u64
    }
}

impl ForegroundMask {
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            data: vec![0; width as usize * height as usize],
            width,
            height,
        }
    }

    pub fn from_raw(data: Vec<u8>, width: u32, height: u32) -> Option<Self> {
        (data.len() == width as usize * height as usize).then_some(Self {
            data,
            width,
            height,
        })
    }

    pub fn foreground_pixels(&self) -> usize {
        self.data.iter().filter(|&&v| v == FOREGROUND).count()
    }

    /// Values strictly above `threshold` become foreground, the rest zero.
    pub fn binarize(&self, threshold: u8) -> ForegroundMask {
        ForegroundMask {
            data: self
                .data
                .iter()
                .map(|&v| if v > threshold { FOREGROUND } else { 0 })
                .collect(),
            width: self.width,
            height: self.height,
        }
    }

    /// All 8-connected foreground regions, in raster order of their first pixel.
    pub fn regions(&self) -> Vec<Region> {
        let width = self.width as usize;
        let height = self.height as usize;
        let mut visited = vec![false; self.data.len()];
        let mut regions = Vec::new();
        let mut stack = Vec::new();

        for start in 0..self.data.len() {
            if visited[start] || self.data[start] != FOREGROUND {
                continue;
            }
            visited[start] = true;
            stack.push(start);
            let (sx, sy) = ((start % width) as u32, (start / width) as u32);
            let mut region = Region {
                pixel_count: 0,
                x0: sx,
                y0: sy,
                x1: sx,
                y1: sy,
            };

            while let Some(idx) = stack.pop() {
                let (x, y) = (idx % width, idx / width);
                region.pixel_count += 1;
                region.x0 = region.x0.min(x as u32);
                region.y0 = region.y0.min(y as u32);
                region.x1 = region.x1.max(x as u32);
                region.y1 = region.y1.max(y as u32);

                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        let nx = x as i64 + dx;
                        let ny = y as i64 + dy;
                        if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                            continue;
                        }
                        let n = ny as usize * width + nx as usize;
                        if !visited[n] && self.data[n] == FOREGROUND {
                            visited[n] = true;
                            stack.push(n);
                        }
                    }
                }
            }
            regions.push(region);
        }
        regions
    }

    /// Region with the most pixels. Ties keep the first in raster order.
    ///
    /// Pixel count stands in for contour area, so a compact blob outranks a
    /// sparse one even when the sparse one spans a bigger bounding box. Only
    /// the winner's bounding box is measured against the trigger threshold.
    pub fn largest_region(&self) -> Option<Region> {
        self.regions()
            .into_iter()
            .fold(None, |best: Option<Region>, r| match best {
                Some(b) if b.pixel_count >= r.pixel_count => Some(b),
                _ => Some(r),
            })
    }
}
