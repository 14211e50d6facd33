use serde::{Deserialize, Serialize};

use crate::frame::BoundingBox;

/// One labeled box from the object detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    /// Always within [0, 1].
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }

    pub fn is_person(&self) -> bool {
        self.label.to_lowercase().contains("person")
    }

    /// Plant-like labels: "potted plant", "tree", "plant", ...
    pub fn is_plant(&self) -> bool {
        let label = self.label.to_lowercase();
        label.contains("plant") || label.contains("potted") || label.contains("tree")
    }
}

/// Result of one detector call.
///
/// `Degraded` keeps the inference failure visible to the caller while still
/// behaving like an empty detection list.
#[derive(Clone, Debug, PartialEq)]
pub enum DetectOutcome {
    Detected(Vec<Detection>),
    Degraded { error: String },
    Unavailable,
}

impl DetectOutcome {
    pub fn detections(&self) -> &[Detection] {
        match self {
            DetectOutcome::Detected(detections) => detections,
            DetectOutcome::Degraded { .. } | DetectOutcome::Unavailable => &[],
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, DetectOutcome::Degraded { .. })
    }

    /// Largest-area person box, if any.
    pub fn primary_person(&self) -> Option<BoundingBox> {
        self.detections()
            .iter()
            .filter(|d| d.is_person())
            .max_by_key(|d| d.bbox.area())
            .map(|d| d.bbox)
    }

    pub fn has_plant(&self) -> bool {
        self.detections().iter().any(Detection::is_plant)
    }
}

/// Greedy per-label non-maximum suppression.
///
/// Keeps the highest-confidence box of every overlapping group (IoU above
/// `iou_threshold`) sharing a label.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let overlaps = kept.iter().any(|k| {
            k.label == candidate.label && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}
