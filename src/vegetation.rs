//! Color-based vegetation heuristic.
//!
//! Fallback for frames where the object detector reports no plant label: a
//! green/yellow-green HSV band, cleaned by a 5x5 opening, and accepted when
//! an external contour encloses enough area. With `cv-opencv` the mask and
//! contours come from OpenCV; otherwise from imageproc.

use anyhow::Result;
use image::{imageops, RgbImage};

use crate::frame::{PixelRect, Roi};

/// HSV band, OpenCV scaling: hue 0..=180, saturation and value 0..=255.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HsvBand {
    pub low: [u8; 3],
    pub high: [u8; 3],
}

impl HsvBand {
    pub const VEGETATION: HsvBand = HsvBand {
        low: [25, 35, 35],
        high: [95, 255, 255],
    };

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| hsv[i] >= self.low[i] && hsv[i] <= self.high[i])
    }
}

/// RGB to HSV with hue halved into 0..=180.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(i32::from);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max == 0 { 0 } else { (255 * delta + max / 2) / max };
    let h = if delta == 0 {
        0.0
    } else {
        let d = delta as f32;
        let deg = if max == r {
            60.0 * (g - b) as f32 / d
        } else if max == g {
            120.0 + 60.0 * (b - r) as f32 / d
        } else {
            240.0 + 60.0 * (r - g) as f32 / d
        };
        if deg < 0.0 {
            deg + 360.0
        } else {
            deg
        }
    };
    [
        ((h / 2.0).round() as i32).clamp(0, 180) as u8,
        s.clamp(0, 255) as u8,
        max as u8,
    ]
}

#[derive(Clone, Debug)]
pub struct VegetationDetector {
    band: HsvBand,
    /// Radius of the square opening element (2 → 5x5).
    open_radius: u8,
}

impl Default for VegetationDetector {
    fn default() -> Self {
        Self {
            band: HsvBand::VEGETATION,
            open_radius: 2,
        }
    }
}

impl VegetationDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff a vegetation contour of at least `min_area` lies inside `roi`
    /// (or the whole frame when the ROI is missing or empty).
    pub fn has_vegetation(&self, frame: &RgbImage, roi: Option<Roi>, min_area: u32) -> Result<bool> {
        Ok(self.largest_area(frame, roi)? >= f64::from(min_area.max(1)))
    }

    /// Area of the largest external contour of the cleaned mask. A filled
    /// w x h blob measures (w-1)(h-1).
    pub fn largest_area(&self, frame: &RgbImage, roi: Option<Roi>) -> Result<f64> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(0.0);
        }
        let rect = PixelRect::resolve(roi, frame.width(), frame.height());
        let crop = imageops::crop_imm(frame, rect.x, rect.y, rect.width, rect.height).to_image();
        self.largest_contour_area(&crop)
    }

    #[cfg(feature = "cv-opencv")]
    fn largest_contour_area(&self, crop: &RgbImage) -> Result<f64> {
        use opencv::core::{self, Mat, Point, Scalar, Size, Vector};
        use opencv::imgproc;

        let rgb = crate::cv::rgb_mat(crop)?;
        let mut hsv = Mat::default();
        imgproc::cvt_color(&rgb, &mut hsv, imgproc::COLOR_RGB2HSV, 0)?;

        let bound = |v: [u8; 3]| Scalar::new(f64::from(v[0]), f64::from(v[1]), f64::from(v[2]), 0.0);
        let mut mask = Mat::default();
        core::in_range(&hsv, &bound(self.band.low), &bound(self.band.high), &mut mask)?;

        let side = 2 * i32::from(self.open_radius) + 1;
        let anchor = Point::new(-1, -1);
        let kernel =
            imgproc::get_structuring_element(imgproc::MORPH_RECT, Size::new(side, side), anchor)?;
        let mut opened = Mat::default();
        imgproc::morphology_ex(
            &mask,
            &mut opened,
            imgproc::MORPH_OPEN,
            &kernel,
            anchor,
            1,
            core::BORDER_CONSTANT,
            imgproc::morphology_default_border_value()?,
        )?;

        let mut contours = Vector::<Vector<Point>>::new();
        imgproc::find_contours(
            &opened,
            &mut contours,
            imgproc::RETR_EXTERNAL,
            imgproc::CHAIN_APPROX_SIMPLE,
            Point::new(0, 0),
        )?;
        let mut largest = 0.0f64;
        for contour in contours.iter() {
            largest = largest.max(imgproc::contour_area(&contour, false)?);
        }
        Ok(largest)
    }

    #[cfg(not(feature = "cv-opencv"))]
    fn largest_contour_area(&self, crop: &RgbImage) -> Result<f64> {
        use image::{GrayImage, Luma};
        use imageproc::contours::{find_contours, BorderType};
        use imageproc::distance_transform::Norm;
        use imageproc::geometry::contour_area;
        use imageproc::morphology;

        let mask = GrayImage::from_fn(crop.width(), crop.height(), |x, y| {
            let hsv = rgb_to_hsv(crop.get_pixel(x, y).0);
            Luma([if self.band.contains(hsv) { 255 } else { 0 }])
        });
        let opened = morphology::open(&mask, Norm::LInf, self.open_radius);

        // Border following only starts outer contours right of a background
        // pixel, so regions touching the left edge need a frame of zeros.
        let mut padded = GrayImage::new(opened.width() + 2, opened.height() + 2);
        imageops::replace(&mut padded, &opened, 1, 1);

        Ok(find_contours::<i32>(&padded)
            .iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .map(|c| contour_area(&c.points))
            .fold(0.0, f64::max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const SOIL: Rgb<u8> = Rgb([110, 85, 60]);
    const LEAF: Rgb<u8> = Rgb([40, 160, 40]);

    fn paint(frame: &mut RgbImage, x0: u32, y0: u32, w: u32, h: u32, color: Rgb<u8>) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                frame.put_pixel(x, y, color);
            }
        }
    }

    #[test]
    fn hsv_matches_opencv_scaling() {
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 0]), [0, 0, 0]);
        assert!(HsvBand::VEGETATION.contains(rgb_to_hsv(LEAF.0)));
        assert!(!HsvBand::VEGETATION.contains(rgb_to_hsv(SOIL.0)));
    }

    #[test]
    fn green_patch_is_found() -> Result<()> {
        let mut frame = RgbImage::from_pixel(100, 100, SOIL);
        paint(&mut frame, 30, 30, 20, 20, LEAF);
        let detector = VegetationDetector::new();
        assert!(detector.has_vegetation(&frame, None, 150)?);
        assert!(!detector.has_vegetation(&frame, None, 800)?);
        Ok(())
    }

    #[test]
    fn area_is_the_contour_polygon() -> Result<()> {
        let detector = VegetationDetector::new();

        let mut frame = RgbImage::from_pixel(100, 100, SOIL);
        paint(&mut frame, 30, 30, 29, 29, LEAF);
        assert_eq!(detector.largest_area(&frame, None)?, 28.0 * 28.0);
        assert!(!detector.has_vegetation(&frame, None, 800)?);

        let mut frame = RgbImage::from_pixel(100, 100, SOIL);
        paint(&mut frame, 30, 30, 30, 30, LEAF);
        assert_eq!(detector.largest_area(&frame, None)?, 29.0 * 29.0);
        assert!(detector.has_vegetation(&frame, None, 800)?);
        Ok(())
    }

    #[test]
    fn region_on_the_left_edge_is_measured() -> Result<()> {
        let mut frame = RgbImage::from_pixel(100, 100, SOIL);
        paint(&mut frame, 0, 20, 40, 40, LEAF);
        let detector = VegetationDetector::new();
        assert!(detector.largest_area(&frame, None)? >= 800.0);
        Ok(())
    }

    #[test]
    fn thin_speckle_is_removed_by_opening() -> Result<()> {
        let mut frame = RgbImage::from_pixel(100, 100, SOIL);
        // Lines 2 px wide cannot survive a 5x5 opening.
        paint(&mut frame, 0, 10, 100, 2, LEAF);
        paint(&mut frame, 50, 0, 2, 100, LEAF);
        let detector = VegetationDetector::new();
        assert_eq!(detector.largest_area(&frame, None)?, 0.0);
        Ok(())
    }

    #[test]
    fn roi_limits_search() -> Result<()> {
        let mut frame = RgbImage::from_pixel(100, 100, SOIL);
        paint(&mut frame, 60, 60, 30, 30, LEAF);
        let detector = VegetationDetector::new();
        assert!(!detector.has_vegetation(&frame, Some(Roi::new(0, 0, 50, 50)), 150)?);
        assert!(detector.has_vegetation(&frame, Some(Roi::new(40, 40, 200, 200)), 150)?);
        Ok(())
    }

    #[test]
    fn empty_roi_scans_whole_frame() -> Result<()> {
        let mut frame = RgbImage::from_pixel(100, 100, SOIL);
        paint(&mut frame, 10, 10, 30, 30, LEAF);
        let detector = VegetationDetector::new();
        assert!(detector.has_vegetation(&frame, Some(Roi::new(300, 300, 400, 400)), 150)?);
        Ok(())
    }
}
