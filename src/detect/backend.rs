use anyhow::Result;
use image::RgbImage;

use crate::detect::result::Detection;

/// Detector backend trait.
///
/// A backend turns one RGB frame into labeled boxes. Errors returned from
/// `detect` are contained by `ObjectDetector` and only affect the frame they
/// occurred on; an error from `warm_up` marks the backend as unusable.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// Returned boxes are in pixel coordinates of `frame`. Order is not significant.
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>>;

    /// Load-time check, run once when the detector is constructed.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
