//! Sampled frames and pixel-space regions.
//!
//! - `SampledFrame`: one frame written to disk by the sampler, in temporal order.
//! - `BoundingBox`: integer pixel box produced by a detector (`x1 < x2`, `y1 < y2`).
//! - `Roi`: a requested region of interest. It may extend past the frame and is
//!   clamped to the frame only when it is applied.

use anyhow::{anyhow, Result};
use image::{GrayImage, ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One frame emitted by the sampler.
///
/// Indices are contiguous from 0. The file name is `frame_{index:05}.{ext}` so a
/// lexicographic directory listing reproduces temporal order.
#[derive(Clone, Debug, PartialEq)]
pub struct SampledFrame {
    pub index: usize,
    pub path: PathBuf,
    /// Position of the frame in the source video, in seconds.
    pub timestamp_secs: f64,
}

impl SampledFrame {
    pub fn file_name(index: usize, format: FrameFormat) -> String {
        format!("frame_{:05}.{}", index, format.extension())
    }

    pub fn load_rgb(&self) -> Result<RgbImage> {
        load_rgb(&self.path)
    }
}

pub(crate) fn load_rgb(path: &Path) -> Result<RgbImage> {
    let img = image::open(path)
        .map_err(|e| anyhow!("failed to read frame {}: {}", path.display(), e))?;
    Ok(img.to_rgb8())
}

/// Grayscale conversion used for motion estimation.
pub fn to_gray(frame: &RgbImage) -> GrayImage {
    image::imageops::grayscale(frame)
}

/// Image format of frames written by the sampler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    #[default]
    Jpeg,
    Png,
}

impl FrameFormat {
    pub fn extension(self) -> &'static str {
        match self {
            FrameFormat::Jpeg => "jpg",
            FrameFormat::Png => "png",
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            FrameFormat::Jpeg => ImageFormat::Jpeg,
            FrameFormat::Png => ImageFormat::Png,
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(FrameFormat::Jpeg),
            "png" => Ok(FrameFormat::Png),
            other => Err(anyhow!("unknown frame format '{}' (expected jpeg|png)", other)),
        }
    }
}

/// Detector output box in integer pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Round a floating-point box and clip it to a `width` x `height` frame.
    ///
    /// Returns `None` when nothing of positive area is left.
    pub fn clipped(x1: f32, y1: f32, x2: f32, y2: f32, width: u32, height: u32) -> Option<Self> {
        if !(x1.is_finite() && y1.is_finite() && x2.is_finite() && y2.is_finite()) {
            return None;
        }
        let w = width as f32;
        let h = height as f32;
        let bbox = Self {
            x1: x1.round().clamp(0.0, w) as i32,
            y1: y1.round().clamp(0.0, h) as i32,
            x2: x2.round().clamp(0.0, w) as i32,
            y2: y2.round().clamp(0.0, h) as i32,
        };
        (bbox.x1 < bbox.x2 && bbox.y1 < bbox.y2).then_some(bbox)
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = ((ix2 - ix1).max(0) as i64 * (iy2 - iy1).max(0) as i64) as f32;
        if inter == 0.0 {
            return 0.0;
        }
        inter / ((self.area() + other.area()) as f32 - inter)
    }
}

/// Region of interest in pixel coordinates of the full frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// An ROI after clamping: a non-empty rectangle fully inside the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Clamp to a `width` x `height` frame. `None` if the clamped region is empty.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<PixelRect> {
        let x1 = self.x1.max(0) as i64;
        let y1 = self.y1.max(0) as i64;
        let x2 = (self.x2 as i64).min(width as i64);
        let y2 = (self.y2 as i64).min(height as i64);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(PixelRect {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
        })
    }
}

impl PixelRect {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// Resolve an optional ROI: a missing or empty ROI covers the whole frame.
    pub fn resolve(roi: Option<Roi>, width: u32, height: u32) -> Self {
        roi.and_then(|r| r.clamp_to(width, height))
            .unwrap_or_else(|| Self::full(width, height))
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}
