//! Response shape returned to callers of the verifier.
//!
//! The confidence score is presentation only; pass/fail comes from the verdict.

use serde::{Deserialize, Serialize};

use crate::evidence::{Evidence, Verdict};
use crate::gps::{GeoPoint, GpsRejection};

/// Points credited for a verified planting.
pub const POINTS_AWARDED: u32 = 10;
/// Motion samples included in a response.
pub const MOTION_SAMPLES_REPORTED: usize = 10;
const FAIL_CONFIDENCE: f32 = 0.3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Fail,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationResponse {
    pub status: Status,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
    pub reason: String,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points_awarded: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps: Option<GeoPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl VerificationResponse {
    pub fn from_verdict(verdict: &Verdict, gps: Option<GeoPoint>) -> Self {
        let mut evidence = verdict.evidence.clone();
        evidence.motion_samples.truncate(MOTION_SAMPLES_REPORTED);
        Self {
            status: if verdict.passed {
                Status::Success
            } else {
                Status::Fail
            },
            passed: verdict.passed,
            reason: verdict.reason().to_string(),
            confidence: confidence_score(verdict),
            points_awarded: verdict.passed.then_some(POINTS_AWARDED),
            evidence: Some(evidence),
            gps,
            detail: None,
        }
    }

    /// Request rejected by the location gate; no video was processed.
    pub fn gps_failed(rejection: GpsRejection) -> Self {
        Self {
            status: Status::Fail,
            passed: false,
            evidence: None,
            reason: "gps_failed".to_string(),
            confidence: 0.0,
            points_awarded: None,
            gps: None,
            detail: Some(rejection.to_string()),
        }
    }
}

/// Weighted blend of plant ratio, person ratio and normalised motion,
/// clamped to [0.5, 0.95] on pass; a flat 0.3 on fail.
pub fn confidence_score(verdict: &Verdict) -> f32 {
    if !verdict.passed {
        return FAIL_CONFIDENCE;
    }
    let evidence = &verdict.evidence;
    let frames = evidence.num_frames.max(1) as f32;
    let plant_ratio = evidence.plant_frames.len() as f32 / frames;
    let person_ratio = evidence.person_frames.len() as f32 / frames;
    let motion = (evidence.avg_motion / 2.0).min(1.0);
    (0.4 * plant_ratio + 0.3 * person_ratio + 0.3 * motion).clamp(0.5, 0.95)
}
