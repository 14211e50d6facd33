mod backend;
mod backends;
mod detector;
mod labels;
mod result;

pub use backend::DetectorBackend;
pub use backends::{StubBackend, PERSON_MARKER};
pub use detector::ObjectDetector;
pub use labels::{LabelTable, COCO_CLASSES};
pub use result::{non_max_suppression, DetectOutcome, Detection};

#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
