use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::BoundingBox;

/// Marker colour the stub backend reports as a person.
pub const PERSON_MARKER: [u8; 3] = [255, 0, 255];

const DEFAULT_TOLERANCE: u8 = 40;
const DEFAULT_MIN_PIXELS: u32 = 64;
const STUB_CONFIDENCE: f32 = 0.9;

#[derive(Clone, Debug)]
struct ColorMarker {
    label: String,
    color: [u8; 3],
}

/// Stub backend for testing and demos.
///
/// Reports one box per marker colour: the bounding box of every pixel within
/// `tolerance` of the marker on each channel. No model is loaded.
pub struct StubBackend {
    markers: Vec<ColorMarker>,
    tolerance: u8,
    min_pixels: u32,
}

impl StubBackend {
    /// Backend that reports magenta regions as `person`.
    pub fn new() -> Self {
        Self {
            markers: Vec::new(),
            tolerance: DEFAULT_TOLERANCE,
            min_pixels: DEFAULT_MIN_PIXELS,
        }
        .with_marker("person", PERSON_MARKER)
    }

    pub fn with_marker(mut self, label: impl Into<String>, color: [u8; 3]) -> Self {
        self.markers.push(ColorMarker {
            label: label.into(),
            color,
        });
        self
    }

    /// Smallest matching pixel count that still yields a detection.
    pub fn with_min_pixels(mut self, min_pixels: u32) -> Self {
        self.min_pixels = min_pixels;
        self
    }

    fn locate(&self, frame: &RgbImage, color: [u8; 3]) -> Option<BoundingBox> {
        let mut count = 0u32;
        let (mut x1, mut y1) = (u32::MAX, u32::MAX);
        let (mut x2, mut y2) = (0u32, 0u32);
        for (x, y, pixel) in frame.enumerate_pixels() {
            let matches = pixel
                .0
                .iter()
                .zip(color.iter())
                .all(|(&p, &c)| p.abs_diff(c) <= self.tolerance);
            if matches {
                count += 1;
                x1 = x1.min(x);
                y1 = y1.min(y);
                x2 = x2.max(x);
                y2 = y2.max(y);
            }
        }
        if count < self.min_pixels.max(1) {
            return None;
        }
        Some(BoundingBox {
            x1: x1 as i32,
            y1: y1 as i32,
            x2: x2 as i32 + 1,
            y2: y2 as i32 + 1,
        })
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        Ok(self
            .markers
            .iter()
            .filter_map(|marker| {
                self.locate(frame, marker.color)
                    .map(|bbox| Detection::new(marker.label.clone(), STUB_CONFIDENCE, bbox))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn finds_person_marker_box() -> Result<()> {
        let mut frame = RgbImage::from_pixel(64, 48, Rgb([110, 85, 60]));
        for y in 10..30 {
            for x in 20..40 {
                frame.put_pixel(x, y, Rgb(PERSON_MARKER));
            }
        }
        let mut backend = StubBackend::new();
        let detections = backend.detect(&frame)?;
        assert_eq!(detections.len(), 1);
        assert!(detections[0].is_person());
        assert_eq!(
            detections[0].bbox,
            BoundingBox {
                x1: 20,
                y1: 10,
                x2: 40,
                y2: 30
            }
        );
        Ok(())
    }

    #[test]
    fn ignores_tiny_marker_regions() -> Result<()> {
        let mut frame = RgbImage::from_pixel(64, 48, Rgb([0, 0, 0]));
        frame.put_pixel(5, 5, Rgb(PERSON_MARKER));
        let mut backend = StubBackend::new();
        assert!(backend.detect(&frame)?.is_empty());
        Ok(())
    }

    #[test]
    fn extra_markers_get_their_own_label() -> Result<()> {
        let frame = RgbImage::from_pixel(16, 16, Rgb([0, 0, 255]));
        let mut backend = StubBackend::new()
            .with_marker("potted plant", [0, 0, 255])
            .with_min_pixels(1);
        let detections = backend.detect(&frame)?;
        assert_eq!(detections.len(), 1);
        assert!(detections[0].is_plant());
        Ok(())
    }
}
