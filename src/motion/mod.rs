//! Dense optical-flow motion estimate between consecutive frames.
//!
//! With the `cv-opencv` feature the flow is OpenCV's Farneback estimator;
//! without it a pyramidal Lucas-Kanade on imageproc primitives stands in.
//! Either way the motion value of a frame pair is the mean flow magnitude
//! over a region of interest.

use anyhow::{anyhow, Result};
use image::GrayImage;

use crate::frame::{PixelRect, Roi};

#[cfg(feature = "cv-opencv")]
mod farneback;
#[cfg(not(feature = "cv-opencv"))]
mod lucas_kanade;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowParams {
    /// Scale between pyramid levels, in (0, 1).
    pub pyr_scale: f32,
    /// Pyramid levels including the full-resolution image.
    pub levels: u32,
    /// Side of the square averaging window (odd).
    pub win_size: u32,
    /// Refinement passes per level.
    pub iterations: u32,
    /// Neighbourhood of the polynomial expansion (5 or 7).
    pub poly_n: u32,
    /// Gaussian sigma of the polynomial expansion.
    pub poly_sigma: f32,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            pyr_scale: 0.5,
            levels: 3,
            win_size: 15,
            iterations: 3,
            poly_n: 5,
            poly_sigma: 1.2,
        }
    }
}

impl FlowParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.pyr_scale > 0.0 && self.pyr_scale < 1.0) {
            return Err(anyhow!("pyr_scale must be within (0, 1)"));
        }
        if self.levels == 0 {
            return Err(anyhow!("flow levels must be >= 1"));
        }
        if self.win_size < 3 || self.win_size % 2 == 0 {
            return Err(anyhow!("flow win_size must be an odd number >= 3"));
        }
        if self.iterations == 0 {
            return Err(anyhow!("flow iterations must be >= 1"));
        }
        if !matches!(self.poly_n, 5 | 7) {
            return Err(anyhow!("flow poly_n must be 5 or 7"));
        }
        if !(self.poly_sigma.is_finite() && self.poly_sigma > 0.0) {
            return Err(anyhow!("flow poly_sigma must be a positive number"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct MotionEstimator {
    params: FlowParams,
}

impl MotionEstimator {
    pub fn new(params: FlowParams) -> Self {
        Self { params }
    }

    /// Mean flow magnitude inside `roi` (whole frame if missing or empty).
    ///
    /// Identical frames yield exactly 0.
    pub fn motion(&self, prev: &GrayImage, next: &GrayImage, roi: Option<Roi>) -> Result<f32> {
        if prev.dimensions() != next.dimensions() {
            return Err(anyhow!(
                "frame size changed from {}x{} to {}x{}",
                prev.width(),
                prev.height(),
                next.width(),
                next.height()
            ));
        }
        if prev.as_raw() == next.as_raw() {
            return Ok(0.0);
        }
        let rect = PixelRect::resolve(roi, prev.width(), prev.height());
        if rect.area() == 0 {
            return Ok(0.0);
        }
        let value = mean_flow_magnitude(&self.params, prev, next, rect)?;
        Ok(if value.is_finite() { value.max(0.0) } else { 0.0 })
    }
}

#[cfg(feature = "cv-opencv")]
fn mean_flow_magnitude(
    params: &FlowParams,
    prev: &GrayImage,
    next: &GrayImage,
    rect: PixelRect,
) -> Result<f32> {
    farneback::mean_magnitude(params, prev, next, rect)
}

#[cfg(not(feature = "cv-opencv"))]
fn mean_flow_magnitude(
    params: &FlowParams,
    prev: &GrayImage,
    next: &GrayImage,
    rect: PixelRect,
) -> Result<f32> {
    Ok(lucas_kanade::mean_magnitude(params, prev, next, rect))
}
