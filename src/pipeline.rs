//! End-to-end verification of one video.
//!
//! sample → per-frame detection and motion → aggregate, inside a per-run
//! working directory that is removed afterwards whatever the outcome.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::VerifierConfig;
use crate::detect::ObjectDetector;
use crate::evidence::{aggregate, Verdict};
use crate::gps::{validate_gps, GeoPoint};
use crate::ingest::{extract_frames, NoFrames, VideoSource};
use crate::report::VerificationResponse;

/// Owns the detector and configuration for a sequence of runs.
///
/// One verifier serves one run at a time; use one verifier per concurrent
/// request.
#[derive(Debug)]
pub struct PlantingVerifier {
    config: VerifierConfig,
    detector: ObjectDetector,
}

impl PlantingVerifier {
    pub fn new(config: VerifierConfig, detector: ObjectDetector) -> Self {
        Self { config, detector }
    }

    /// Build the detector described by the configuration.
    pub fn from_config(config: VerifierConfig) -> Self {
        let detector = ObjectDetector::from_config(&config.detector);
        Self::new(config, detector)
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn detector(&self) -> &ObjectDetector {
        &self.detector
    }

    /// Full request: location gate, then verification, as a caller-facing response.
    ///
    /// Supplied coordinates win over the video's embedded geotag. A rejected
    /// location fails the request before any frame is decoded.
    pub fn verify_request(
        &mut self,
        path: &str,
        supplied: Option<GeoPoint>,
    ) -> Result<VerificationResponse> {
        let source = VideoSource::open(path);
        let geotag = source.as_ref().ok().and_then(VideoSource::geotag);
        let location = match validate_gps(
            supplied,
            geotag.as_deref(),
            &self.config.gps.allowed_region,
        ) {
            Ok(point) => point,
            Err(rejection) => {
                log::warn!("location rejected for {}: {}", path, rejection);
                return Ok(VerificationResponse::gps_failed(rejection));
            }
        };

        let verdict = match source {
            Ok(source) => self.verify(source)?,
            Err(err) => self.no_frames_or(err)?,
        };
        Ok(VerificationResponse::from_verdict(&verdict, Some(location)))
    }

    /// Open and verify a local video path or `stub://` scene.
    pub fn verify_path(&mut self, path: &str) -> Result<Verdict> {
        match VideoSource::open(path) {
            Ok(source) => self.verify(source),
            Err(err) => self.no_frames_or(err),
        }
    }

    /// Verify an already opened source.
    ///
    /// Errors are reserved for fatal conditions (frame I/O, motion on
    /// inconsistent frames); every expected failure is a failing verdict.
    pub fn verify(&mut self, mut source: VideoSource) -> Result<Verdict> {
        let work_dir = WorkDir::create(&self.config)?;

        let frames = match extract_frames(&mut source, work_dir.path(), &self.config.sampling) {
            Ok(frames) => frames,
            Err(err) => return self.no_frames_or(err),
        };

        aggregate(&mut self.detector, &frames, &self.config)
    }

    fn no_frames_or(&self, err: anyhow::Error) -> Result<Verdict> {
        match err.downcast_ref::<NoFrames>() {
            Some(no_frames) => {
                log::warn!("{}", no_frames);
                Ok(Verdict::no_frames(self.detector.status()))
            }
            None => Err(err),
        }
    }
}

/// Per-run frame directory, removed on drop.
pub struct WorkDir {
    inner: WorkDirKind,
}

enum WorkDirKind {
    Temp(tempfile::TempDir),
    Fixed(PathBuf),
}

impl WorkDir {
    /// A fresh directory under `storage.work_root` (or the system temp dir),
    /// or the fixed `storage.frames_dir`, emptied first.
    pub fn create(config: &VerifierConfig) -> Result<Self> {
        if let Some(dir) = &config.storage.frames_dir {
            if dir.exists() {
                std::fs::remove_dir_all(dir).with_context(|| {
                    format!("failed to clear frame directory {}", dir.display())
                })?;
            }
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create frame directory {}", dir.display()))?;
            return Ok(Self {
                inner: WorkDirKind::Fixed(dir.clone()),
            });
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("planting-frames-");
        let temp = match &config.storage.work_root {
            Some(root) => {
                std::fs::create_dir_all(root).with_context(|| {
                    format!("failed to create work root {}", root.display())
                })?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .context("failed to create frame directory")?;
        Ok(Self {
            inner: WorkDirKind::Temp(temp),
        })
    }

    pub fn path(&self) -> &Path {
        match &self.inner {
            WorkDirKind::Temp(dir) => dir.path(),
            WorkDirKind::Fixed(dir) => dir,
        }
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        let path = self.path().to_path_buf();
        let result = match std::mem::replace(&mut self.inner, WorkDirKind::Fixed(PathBuf::new())) {
            WorkDirKind::Temp(dir) => dir.close(),
            WorkDirKind::Fixed(dir) => std::fs::remove_dir_all(&dir),
        };
        if let Err(err) = result {
            log::warn!("failed to remove frame directory {}: {}", path.display(), err);
        }
    }
}
