//! Planting verifier
//!
//! Decides from a short video whether a person planted vegetation: someone is
//! in frame, plant evidence sits near them, and there is enough motion at
//! ground level.
//!
//! # Pipeline
//!
//! 1. **Sample**: decode the video and keep about `sample_fps` frames per
//!    second, at most `max_frames`, written to a per-run directory.
//! 2. **Observe**: per frame, run the object detector, fall back to the
//!    color heuristic for vegetation, and estimate dense optical flow against
//!    the previous frame.
//! 3. **Decide**: person, plant and motion gates in that order; the first
//!    failing gate names the reason.
//!
//! Expected failures (no frames, nobody in frame, no plant, no motion, bad
//! location) are verdicts, not errors.
//!
//! # Module Structure
//!
//! - `ingest`: video sources and the frame sampler
//! - `detect`: object detector (active backend or unavailable)
//! - `vegetation`, `motion`: heuristic plant and ground-motion signals
//! - `evidence`: per-frame aggregation and the decision gates
//! - `pipeline`: per-run orchestration and working directory
//! - `gps`, `report`, `storage`: location gate, responses, evidence log
//!
//! # Features
//!
//! - `decode-ffmpeg`: decode local video files with ffmpeg
//! - `backend-tract`: YOLOv8 ONNX detector on tract
//! - `cv-opencv`: Farneback flow and contour-area vegetation on OpenCV
//!   (needs a system OpenCV); without it both run on imageproc

use anyhow::Result;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod config;
#[cfg(feature = "cv-opencv")]
mod cv;
pub mod detect;
pub mod evidence;
pub mod frame;
pub mod gps;
pub mod ingest;
pub mod log;
pub mod motion;
pub mod pipeline;
pub mod report;
pub mod storage;
pub mod vegetation;

pub use config::{BackendKind, VerifierConfig};
pub use detect::{DetectOutcome, Detection, DetectorBackend, ObjectDetector, StubBackend};
pub use evidence::{aggregate, decide, Evidence, EvidenceAggregator, Reason, Verdict};
pub use frame::{BoundingBox, FrameFormat, Roi, SampledFrame};
pub use gps::{parse_iso6709, validate_gps, BoundingRegion, GeoPoint, GpsRejection};
pub use ingest::{extract_frames, NoFrames, Scene, SyntheticVideo, VideoSource};
pub use log::hash_entry;
pub use motion::{FlowParams, MotionEstimator};
pub use pipeline::PlantingVerifier;
pub use report::{confidence_score, VerificationResponse};
pub use storage::{EvidenceLog, EvidenceRecord, InMemoryEvidenceLog, SqliteEvidenceLog};
pub use vegetation::VegetationDetector;

pub(crate) fn now_s() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}
