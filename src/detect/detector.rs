use image::RgbImage;

use crate::config::{BackendKind, DetectorSettings};
use crate::detect::backend::DetectorBackend;
use crate::detect::backends::StubBackend;
use crate::detect::result::{DetectOutcome, Detection};
use crate::frame::BoundingBox;

/// Object detector with an explicit availability state.
///
/// An unavailable detector is a valid configuration: every frame reports no
/// detections and the pipeline falls back to the vegetation heuristic. A
/// backend error on one frame yields `DetectOutcome::Degraded` for that frame
/// only.
pub enum ObjectDetector {
    Active(Box<dyn DetectorBackend>),
    Unavailable { reason: String },
}

impl ObjectDetector {
    /// Wrap a backend, running its warm-up once. A backend that fails to warm
    /// up leaves the detector unavailable.
    pub fn active(mut backend: Box<dyn DetectorBackend>) -> Self {
        match backend.warm_up() {
            Ok(()) => {
                log::info!("object detector ready (backend: {})", backend.name());
                ObjectDetector::Active(backend)
            }
            Err(err) => {
                log::warn!(
                    "object detector backend '{}' failed to load: {:#}",
                    backend.name(),
                    err
                );
                ObjectDetector::Unavailable {
                    reason: format!("{} backend failed to load: {}", backend.name(), err),
                }
            }
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        ObjectDetector::Unavailable {
            reason: reason.into(),
        }
    }

    /// Build the detector selected by `settings.backend`.
    ///
    /// Never fails: a model that cannot be loaded yields `Unavailable`.
    pub fn from_config(settings: &DetectorSettings) -> Self {
        match settings.backend {
            BackendKind::None => Self::unavailable("object detection disabled by configuration"),
            BackendKind::Stub => Self::active(Box::new(StubBackend::new())),
            BackendKind::Tract => Self::load_tract(settings),
            BackendKind::Auto => {
                if cfg!(feature = "backend-tract") && settings.model_path.exists() {
                    Self::load_tract(settings)
                } else {
                    log::info!(
                        "no detector model at {}; continuing with vegetation heuristic only",
                        settings.model_path.display()
                    );
                    Self::unavailable(format!(
                        "no model available at {}",
                        settings.model_path.display()
                    ))
                }
            }
        }
    }

    #[cfg(feature = "backend-tract")]
    fn load_tract(settings: &DetectorSettings) -> Self {
        use crate::detect::backends::TractBackend;
        use crate::detect::labels::LabelTable;

        let labels = match &settings.labels_path {
            Some(path) => match LabelTable::load(path) {
                Ok(labels) => labels,
                Err(err) => {
                    log::warn!("{:#}", err);
                    return Self::unavailable(err.to_string());
                }
            },
            None => LabelTable::coco(),
        };
        match TractBackend::new(&settings.model_path, settings.input_size) {
            Ok(backend) => Self::active(Box::new(
                backend
                    .with_thresholds(settings.confidence_threshold, settings.iou_threshold)
                    .with_labels(labels),
            )),
            Err(err) => {
                log::warn!("object detector unavailable: {:#}", err);
                Self::unavailable(format!("{:#}", err))
            }
        }
    }

    #[cfg(not(feature = "backend-tract"))]
    fn load_tract(_settings: &DetectorSettings) -> Self {
        log::warn!("object detector unavailable: built without the backend-tract feature");
        Self::unavailable("built without the backend-tract feature")
    }

    pub fn is_available(&self) -> bool {
        matches!(self, ObjectDetector::Active(_))
    }

    /// `active:<backend>` or `unavailable`.
    pub fn status(&self) -> String {
        match self {
            ObjectDetector::Active(backend) => format!("active:{}", backend.name()),
            ObjectDetector::Unavailable { .. } => "unavailable".to_string(),
        }
    }

    /// Detect objects in one frame. Never fails.
    pub fn detect(&mut self, frame: &RgbImage) -> DetectOutcome {
        let backend = match self {
            ObjectDetector::Active(backend) => backend,
            ObjectDetector::Unavailable { .. } => return DetectOutcome::Unavailable,
        };
        match backend.detect(frame) {
            Ok(detections) => DetectOutcome::Detected(sanitize(
                detections,
                frame.width(),
                frame.height(),
            )),
            Err(err) => {
                log::warn!("detector '{}' failed on frame: {:#}", backend.name(), err);
                DetectOutcome::Degraded {
                    error: format!("{:#}", err),
                }
            }
        }
    }
}

impl std::fmt::Debug for ObjectDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectDetector::Active(backend) => {
                f.debug_tuple("Active").field(&backend.name()).finish()
            }
            ObjectDetector::Unavailable { reason } => f
                .debug_struct("Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Clip boxes to the frame and drop the ones left without area.
fn sanitize(detections: Vec<Detection>, width: u32, height: u32) -> Vec<Detection> {
    detections
        .into_iter()
        .filter_map(|d| {
            let b = d.bbox;
            BoundingBox::clipped(
                b.x1 as f32,
                b.y1 as f32,
                b.x2 as f32,
                b.y2 as f32,
                width,
                height,
            )
            .map(|bbox| Detection::new(d.label, d.confidence, bbox))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};

    struct FailingBackend {
        fail_warm_up: bool,
    }

    impl DetectorBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>> {
            Err(anyhow!("inference exploded"))
        }

        fn warm_up(&mut self) -> Result<()> {
            if self.fail_warm_up {
                Err(anyhow!("model missing"))
            } else {
                Ok(())
            }
        }
    }

    struct FixedBackend(Vec<Detection>);

    impl DetectorBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn unavailable_detector_reports_nothing() {
        let mut detector = ObjectDetector::unavailable("no model");
        assert!(!detector.is_available());
        assert_eq!(detector.status(), "unavailable");
        let frame = RgbImage::new(8, 8);
        assert_eq!(detector.detect(&frame), DetectOutcome::Unavailable);
    }

    #[test]
    fn backend_error_degrades_single_frame() {
        let mut detector = ObjectDetector::active(Box::new(FailingBackend {
            fail_warm_up: false,
        }));
        assert!(detector.is_available());
        let outcome = detector.detect(&RgbImage::new(8, 8));
        assert!(outcome.is_degraded());
        assert!(outcome.detections().is_empty());
        assert!(detector.is_available());
    }

    #[test]
    fn failed_warm_up_makes_detector_unavailable() {
        let detector = ObjectDetector::active(Box::new(FailingBackend { fail_warm_up: true }));
        assert!(!detector.is_available());
    }

    #[test]
    fn boxes_are_clipped_to_frame() {
        let mut detector = ObjectDetector::active(Box::new(FixedBackend(vec![
            Detection::new(
                "person",
                0.8,
                BoundingBox {
                    x1: -10,
                    y1: 5,
                    x2: 50,
                    y2: 500,
                },
            ),
            Detection::new(
                "person",
                0.8,
                BoundingBox {
                    x1: 90,
                    y1: 90,
                    x2: 120,
                    y2: 120,
                },
            ),
        ])));
        let outcome = detector.detect(&RgbImage::new(40, 30));
        assert_eq!(
            outcome.detections(),
            &[Detection::new(
                "person",
                0.8,
                BoundingBox {
                    x1: 0,
                    y1: 5,
                    x2: 40,
                    y2: 30
                }
            )]
        );
    }

    #[test]
    fn none_backend_is_unavailable_and_stub_is_active() {
        let mut settings = DetectorSettings {
            backend: BackendKind::None,
            ..DetectorSettings::default()
        };
        assert!(!ObjectDetector::from_config(&settings).is_available());
        settings.backend = BackendKind::Stub;
        let detector = ObjectDetector::from_config(&settings);
        assert_eq!(detector.status(), "active:stub");
    }

    #[test]
    fn auto_without_model_is_unavailable() {
        let settings = DetectorSettings {
            backend: BackendKind::Auto,
            model_path: "/nonexistent/model.onnx".into(),
            ..DetectorSettings::default()
        };
        assert!(!ObjectDetector::from_config(&settings).is_available());
    }
}
