//! Evidence aggregation and the pass/fail decision.
//!
//! One forward pass over the sampled frames collects person frames, plant
//! frames and motion samples. The decision gates run in a fixed order
//! (person, plant, motion) and the first failing gate names the reason; the
//! evidence is attached to every verdict.

use anyhow::Result;
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{Thresholds, VegetationSettings, VerifierConfig};
use crate::detect::ObjectDetector;
use crate::frame::{to_gray, BoundingBox, Roi, SampledFrame};
use crate::motion::MotionEstimator;
use crate::vegetation::VegetationDetector;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    #[serde(rename = "no frames extracted")]
    NoFramesExtracted,
    #[serde(rename = "no person detected")]
    NoPersonDetected,
    #[serde(rename = "no plant detected")]
    NoPlantDetected,
    #[serde(rename = "insufficient ground motion")]
    InsufficientGroundMotion,
    #[serde(rename = "planting verified")]
    PlantingVerified,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::NoFramesExtracted => "no frames extracted",
            Reason::NoPersonDetected => "no person detected",
            Reason::NoPlantDetected => "no plant detected",
            Reason::InsufficientGroundMotion => "insufficient ground motion",
            Reason::PlantingVerified => "planting verified",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Auditable record behind a verdict.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub num_frames: usize,
    /// Indices of frames with at least one person detection.
    pub person_frames: Vec<usize>,
    /// Indices of frames with plant evidence from either source.
    pub plant_frames: Vec<usize>,
    /// Subset of `plant_frames` credited by the color heuristic.
    pub heuristic_plant_frames: Vec<usize>,
    /// Frames whose detector call failed.
    pub degraded_frames: Vec<usize>,
    /// One sample per consecutive frame pair.
    pub motion_samples: Vec<f32>,
    pub avg_motion: f32,
    /// `active:<backend>` or `unavailable`.
    pub detector: String,
    pub reason: Reason,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    pub evidence: Evidence,
}

impl Verdict {
    /// Failing verdict for a run that produced no frames.
    pub fn no_frames(detector: impl Into<String>) -> Self {
        Self {
            passed: false,
            evidence: Evidence {
                num_frames: 0,
                person_frames: Vec::new(),
                plant_frames: Vec::new(),
                heuristic_plant_frames: Vec::new(),
                degraded_frames: Vec::new(),
                motion_samples: Vec::new(),
                avg_motion: 0.0,
                detector: detector.into(),
                reason: Reason::NoFramesExtracted,
            },
        }
    }

    pub fn reason(&self) -> Reason {
        self.evidence.reason
    }
}

/// Apply the gates in order: person, then plant, then motion.
pub fn decide(
    person_frames: usize,
    plant_frames: usize,
    avg_motion: f32,
    thresholds: &Thresholds,
) -> Reason {
    if person_frames == 0 {
        Reason::NoPersonDetected
    } else if plant_frames < thresholds.min_plant_frames {
        Reason::NoPlantDetected
    } else if avg_motion < thresholds.motion_threshold {
        Reason::InsufficientGroundMotion
    } else {
        Reason::PlantingVerified
    }
}

/// Vegetation search region below a person: the box widened by the margin,
/// from its bottom edge down by a fraction of its height plus an extension.
pub fn vegetation_roi(person: BoundingBox, frame_height: u32, settings: &VegetationSettings) -> Roi {
    let below = (person.height() as f32 * settings.roi_below_fraction).floor() as i32;
    Roi::new(
        person.x1 - settings.roi_margin_px,
        person.y2.min(frame_height as i32 - 1),
        person.x2 + settings.roi_margin_px,
        person.y2 + below + settings.roi_extension_px,
    )
}

/// Bottom `band` of a person box, where hands meet the ground.
pub fn motion_roi(person: BoundingBox, band: f32) -> Roi {
    let skip = (person.height() as f32 * (1.0 - band)).floor() as i32;
    Roi::new(person.x1, person.y1 + skip, person.x2, person.y2)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlantSource {
    Detector,
    Heuristic,
}

/// What one frame contributed.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSignals {
    pub index: usize,
    pub person: Option<BoundingBox>,
    pub plant: Option<PlantSource>,
    pub degraded: bool,
    pub motion: Option<f32>,
}

/// Single forward pass over frames in temporal order.
pub struct EvidenceAggregator {
    vegetation_settings: VegetationSettings,
    person_band: f32,
    thresholds: Thresholds,
    vegetation: VegetationDetector,
    motion: MotionEstimator,
    prev_gray: Option<GrayImage>,
    num_frames: usize,
    person_frames: Vec<usize>,
    plant_frames: Vec<usize>,
    heuristic_plant_frames: Vec<usize>,
    degraded_frames: Vec<usize>,
    motion_samples: Vec<f32>,
}

impl EvidenceAggregator {
    pub fn new(config: &VerifierConfig) -> Self {
        Self {
            vegetation_settings: config.vegetation.clone(),
            person_band: config.motion.person_band,
            thresholds: config.thresholds,
            vegetation: VegetationDetector::new(),
            motion: MotionEstimator::new(config.motion.flow),
            prev_gray: None,
            num_frames: 0,
            person_frames: Vec::new(),
            plant_frames: Vec::new(),
            heuristic_plant_frames: Vec::new(),
            degraded_frames: Vec::new(),
            motion_samples: Vec::new(),
        }
    }

    /// Process the next frame.
    pub fn observe(&mut self, detector: &mut ObjectDetector, frame: &RgbImage) -> Result<FrameSignals> {
        let index = self.num_frames;
        self.num_frames += 1;

        let outcome = detector.detect(frame);
        let degraded = outcome.is_degraded();
        if degraded {
            self.degraded_frames.push(index);
        }

        let person = outcome.primary_person();
        if person.is_some() {
            self.person_frames.push(index);
        }

        let plant = if outcome.has_plant() {
            Some(PlantSource::Detector)
        } else {
            let (roi, min_area) = match person {
                Some(bbox) => (
                    Some(vegetation_roi(bbox, frame.height(), &self.vegetation_settings)),
                    self.vegetation_settings.min_area_near_person,
                ),
                None => (None, self.vegetation_settings.min_area_frame),
            };
            self.vegetation
                .has_vegetation(frame, roi, min_area)?
                .then_some(PlantSource::Heuristic)
        };
        match plant {
            Some(PlantSource::Detector) => self.plant_frames.push(index),
            Some(PlantSource::Heuristic) => {
                self.plant_frames.push(index);
                self.heuristic_plant_frames.push(index);
            }
            None => {}
        }

        let gray = to_gray(frame);
        let motion = match &self.prev_gray {
            Some(prev) => {
                let roi = person.map(|bbox| motion_roi(bbox, self.person_band));
                let value = self.motion.motion(prev, &gray, roi)?;
                self.motion_samples.push(value);
                Some(value)
            }
            None => None,
        };
        self.prev_gray = Some(gray);

        log::debug!(
            "frame {}: person={:?} plant={:?} degraded={} motion={:?}",
            index,
            person,
            plant,
            degraded,
            motion
        );

        Ok(FrameSignals {
            index,
            person,
            plant,
            degraded,
            motion,
        })
    }

    /// Apply the gates and produce the verdict.
    pub fn finish(self, detector_status: impl Into<String>) -> Verdict {
        let avg_motion = if self.motion_samples.is_empty() {
            0.0
        } else {
            self.motion_samples.iter().sum::<f32>() / self.motion_samples.len() as f32
        };
        let reason = decide(
            self.person_frames.len(),
            self.plant_frames.len(),
            avg_motion,
            &self.thresholds,
        );
        let passed = reason == Reason::PlantingVerified;
        log::info!(
            "verdict: {} (frames={}, person={}, plant={}, avg_motion={:.3})",
            reason,
            self.num_frames,
            self.person_frames.len(),
            self.plant_frames.len(),
            avg_motion
        );
        Verdict {
            passed,
            evidence: Evidence {
                num_frames: self.num_frames,
                person_frames: self.person_frames,
                plant_frames: self.plant_frames,
                heuristic_plant_frames: self.heuristic_plant_frames,
                degraded_frames: self.degraded_frames,
                motion_samples: self.motion_samples,
                avg_motion,
                detector: detector_status.into(),
                reason,
            },
        }
    }
}

/// Aggregate sampled frames read back from disk.
///
/// An unreadable frame file is an error.
pub fn aggregate(
    detector: &mut ObjectDetector,
    frames: &[SampledFrame],
    config: &VerifierConfig,
) -> Result<Verdict> {
    let mut aggregator = EvidenceAggregator::new(config);
    for frame in frames {
        let image = frame.load_rgb()?;
        aggregator.observe(detector, &image)?;
    }
    Ok(aggregator.finish(detector.status()))
}
