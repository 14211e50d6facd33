//! Video ingestion and frame sampling.
//!
//! - `VideoSource`: local video files (feature: decode-ffmpeg) or built-in
//!   synthetic scenes (`stub://<scene>`)
//! - `extract_frames`: evenly decimated, bounded frame sampling to disk
//!
//! Only local sources are accepted; URL schemes other than `stub://` are rejected.

#[cfg(feature = "decode-ffmpeg")]
mod file_ffmpeg;
mod sampler;
mod source;
mod synthetic;

use std::fmt;

pub use sampler::{decimation_step, extract_frames};
pub use source::VideoSource;
pub use synthetic::{Scene, SyntheticVideo};

/// The source produced no frames: it could not be opened, or decoding ended
/// before a single frame was sampled.
///
/// Recoverable; the orchestrator turns it into a failing verdict.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoFrames {
    detail: String,
}

impl NoFrames {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

impl fmt::Display for NoFrames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no frames extracted: {}", self.detail)
    }
}

impl std::error::Error for NoFrames {}
