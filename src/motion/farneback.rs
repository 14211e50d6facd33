use anyhow::Result;
use image::GrayImage;
use opencv::core::{self, Mat, Rect, Scalar, Vector};
use opencv::prelude::*;
use opencv::{imgproc, video};

use super::FlowParams;
use crate::cv::gray_mat;
use crate::frame::PixelRect;

/// Farneback flow, then the mean of its magnitude under a `rect` mask.
pub(super) fn mean_magnitude(
    params: &FlowParams,
    prev: &GrayImage,
    next: &GrayImage,
    rect: PixelRect,
) -> Result<f32> {
    let prev = gray_mat(prev)?;
    let next = gray_mat(next)?;
    let mut flow = Mat::default();
    video::calc_optical_flow_farneback(
        &prev,
        &next,
        &mut flow,
        f64::from(params.pyr_scale),
        params.levels as i32,
        params.win_size as i32,
        params.iterations as i32,
        params.poly_n as i32,
        f64::from(params.poly_sigma),
        0,
    )?;

    let mut components = Vector::<Mat>::new();
    core::split(&flow, &mut components)?;
    let mut magnitude = Mat::default();
    let mut angle = Mat::default();
    core::cart_to_polar(
        &components.get(0)?,
        &components.get(1)?,
        &mut magnitude,
        &mut angle,
        false,
    )?;

    let mut mask = Mat::new_rows_cols_with_default(
        magnitude.rows(),
        magnitude.cols(),
        core::CV_8UC1,
        Scalar::all(0.0),
    )?;
    imgproc::rectangle(
        &mut mask,
        Rect::new(
            rect.x as i32,
            rect.y as i32,
            rect.width as i32,
            rect.height as i32,
        ),
        Scalar::all(255.0),
        imgproc::FILLED,
        imgproc::LINE_8,
        0,
    )?;
    let mean = core::mean(&magnitude, &mask)?;
    Ok(mean[0] as f32)
}
