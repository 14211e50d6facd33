//! Coarse-to-fine iterative Lucas-Kanade on imageproc primitives.
//!
//! At each pyramid level the second frame is warped by the current flow and a
//! windowed least-squares update is solved per pixel.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::filter::{gaussian_blur_f32, separable_filter, separable_filter_equal};
use imageproc::geometric_transformations::{warp_with, Interpolation};

use super::FlowParams;
use crate::frame::PixelRect;

type Plane = Image<Luma<f32>>;

/// Windows whose structure tensor has a smaller mean eigenvalue are treated
/// as textureless and left unchanged.
const MIN_EIGEN_PER_PIXEL: f32 = 1e-2;
/// Coarsest pyramid level keeps at least this many pixels per side.
const MIN_LEVEL_SIDE: u32 = 8;
const PYRAMID_SIGMA: f32 = 1.0;
/// Keeps bilinear warps inside the last row and column.
const EDGE_INSET: f32 = 1e-3;

pub(super) fn mean_magnitude(
    params: &FlowParams,
    prev: &GrayImage,
    next: &GrayImage,
    rect: PixelRect,
) -> f32 {
    let (u, v) = dense_flow(params, prev, next);
    let mut sum = 0.0f64;
    for y in rect.y..rect.y + rect.height {
        for x in rect.x..rect.x + rect.width {
            let (du, dv) = (u.get_pixel(x, y)[0], v.get_pixel(x, y)[0]);
            sum += f64::from(du.hypot(dv));
        }
    }
    (sum / rect.area() as f64) as f32
}

/// Horizontal and vertical displacement planes from `prev` to `next`.
fn dense_flow(params: &FlowParams, prev: &GrayImage, next: &GrayImage) -> (Plane, Plane) {
    let (width, height) = prev.dimensions();
    if width < 2 || height < 2 {
        return (Plane::new(width, height), Plane::new(width, height));
    }
    let prev_pyramid = pyramid(params, to_plane(prev));
    let next_pyramid = pyramid(params, to_plane(next));

    let mut flow: Option<(Plane, Plane)> = None;
    for (p, n) in prev_pyramid.iter().zip(next_pyramid.iter()).rev() {
        let (w, h) = p.dimensions();
        let (mut u, mut v) = match flow {
            Some((u, v)) => {
                let (sx, sy) = (w as f32 / u.width() as f32, h as f32 / u.height() as f32);
                (upsample(&u, w, h, sx), upsample(&v, w, h, sy))
            }
            None => (Plane::new(w, h), Plane::new(w, h)),
        };
        for _ in 0..params.iterations {
            refine(params, p, n, &mut u, &mut v);
        }
        flow = Some((u, v));
    }
    flow.unwrap_or_else(|| (Plane::new(width, height), Plane::new(width, height)))
}

fn to_plane(img: &GrayImage) -> Plane {
    Plane::from_fn(img.width(), img.height(), |x, y| {
        Luma([f32::from(img.get_pixel(x, y)[0])])
    })
}

fn pyramid(params: &FlowParams, base: Plane) -> Vec<Plane> {
    let mut levels = vec![base];
    while levels.len() < params.levels as usize {
        let Some(last) = levels.last() else { break };
        let width = (last.width() as f32 * params.pyr_scale).round() as u32;
        let height = (last.height() as f32 * params.pyr_scale).round() as u32;
        if width < MIN_LEVEL_SIDE || height < MIN_LEVEL_SIDE {
            break;
        }
        let smoothed = gaussian_blur_f32(last, PYRAMID_SIGMA);
        levels.push(imageops::resize(&smoothed, width, height, FilterType::Triangle));
    }
    levels
}

/// Resample a coarse displacement plane onto a finer grid, scaling values.
fn upsample(plane: &Plane, width: u32, height: u32, factor: f32) -> Plane {
    let mut out = imageops::resize(plane, width, height, FilterType::Triangle);
    for pixel in out.pixels_mut() {
        pixel.0[0] *= factor;
    }
    out
}

fn gradients(plane: &Plane) -> (Plane, Plane) {
    const DIFF: [f32; 3] = [-0.5, 0.0, 0.5];
    const ONE: [f32; 1] = [1.0];
    (
        separable_filter(plane, &DIFF, &ONE),
        separable_filter(plane, &ONE, &DIFF),
    )
}

/// One Lucas-Kanade update of the flow at a single pyramid level.
fn refine(params: &FlowParams, prev: &Plane, next: &Plane, u: &mut Plane, v: &mut Plane) {
    let (w, h) = prev.dimensions();
    let max_x = (w - 1) as f32 - EDGE_INSET;
    let max_y = (h - 1) as f32 - EDGE_INSET;
    let warped = {
        let (u, v) = (&*u, &*v);
        warp_with(
            next,
            move |x, y| {
                let (px, py) = (x as u32, y as u32);
                (
                    (x + u.get_pixel(px, py)[0]).clamp(0.0, max_x),
                    (y + v.get_pixel(px, py)[0]).clamp(0.0, max_y),
                )
            },
            Interpolation::Bilinear,
            Luma([0.0]),
        )
    };

    let (pgx, pgy) = gradients(prev);
    let (wgx, wgy) = gradients(&warped);
    let mut terms: [Plane; 5] = std::array::from_fn(|_| Plane::new(w, h));
    for y in 0..h {
        for x in 0..w {
            let gx = (pgx.get_pixel(x, y)[0] + wgx.get_pixel(x, y)[0]) / 2.0;
            let gy = (pgy.get_pixel(x, y)[0] + wgy.get_pixel(x, y)[0]) / 2.0;
            let gt = warped.get_pixel(x, y)[0] - prev.get_pixel(x, y)[0];
            let values = [gx * gx, gx * gy, gy * gy, gx * gt, gy * gt];
            for (plane, value) in terms.iter_mut().zip(values) {
                plane.put_pixel(x, y, Luma([value]));
            }
        }
    }
    let window = vec![1.0f32; params.win_size as usize];
    let [sxx, sxy, syy, sxt, syt] =
        terms.map(|plane| separable_filter_equal(&plane, window.as_slice()));

    let min_eigen = MIN_EIGEN_PER_PIXEL * (params.win_size * params.win_size) as f32;
    let max_step = params.win_size as f32 / 2.0;
    for y in 0..h {
        for x in 0..w {
            let (a, b, c) = (
                sxx.get_pixel(x, y)[0],
                sxy.get_pixel(x, y)[0],
                syy.get_pixel(x, y)[0],
            );
            let eigen = (a + c) / 2.0 - (((a - c) / 2.0).powi(2) + b * b).sqrt();
            let det = a * c - b * b;
            if eigen < min_eigen || det.abs() <= f32::EPSILON {
                continue;
            }
            let (bx, by) = (sxt.get_pixel(x, y)[0], syt.get_pixel(x, y)[0]);
            let du = -(c * bx - b * by) / det;
            let dv = -(a * by - b * bx) / det;
            if du.is_finite() && dv.is_finite() {
                u.get_pixel_mut(x, y).0[0] += du.clamp(-max_step, max_step);
                v.get_pixel_mut(x, y).0[0] += dv.clamp(-max_step, max_step);
            }
        }
    }
}
