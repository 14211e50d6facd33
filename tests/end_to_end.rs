use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use image::{Rgb, RgbImage};

use planting_verifier::report::{Status, POINTS_AWARDED};
use planting_verifier::{
    Detection, DetectorBackend, FrameFormat, GeoPoint, ObjectDetector, PlantingVerifier, Reason,
    StubBackend, SyntheticVideo, Verdict, VerifierConfig, VideoSource,
};

struct Scratch {
    root: tempfile::TempDir,
}

impl Scratch {
    fn new() -> Result<Self> {
        Ok(Self {
            root: tempfile::tempdir()?,
        })
    }

    fn config(&self) -> VerifierConfig {
        let mut config = VerifierConfig::default();
        config.sampling.frame_format = FrameFormat::Png;
        config.storage.work_root = Some(self.root.path().to_path_buf());
        config.thresholds.motion_threshold = 0.1;
        config
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(std::fs::read_dir(self.root.path())?.next().is_none())
    }
}

fn stub_verifier(config: VerifierConfig) -> PlantingVerifier {
    PlantingVerifier::new(config, ObjectDetector::active(Box::new(StubBackend::new())))
}

fn run_scene(scene: &str) -> Result<Verdict> {
    let scratch = Scratch::new()?;
    let mut verifier = stub_verifier(scratch.config());
    let verdict = verifier.verify_path(&format!("stub://{}", scene))?;
    assert!(scratch.is_empty()?, "frame directory left behind");

    let evidence = &verdict.evidence;
    assert_eq!(evidence.num_frames, 10);
    assert_eq!(evidence.motion_samples.len(), evidence.num_frames - 1);
    assert_eq!(evidence.detector, "active:stub");
    assert_eq!(verdict.passed, verdict.reason() == Reason::PlantingVerified);
    Ok(verdict)
}

#[test]
fn scenario_a_lawn_without_person_fails_on_person() -> Result<()> {
    let verdict = run_scene("lawn")?;
    assert!(!verdict.passed);
    assert_eq!(verdict.reason(), Reason::NoPersonDetected);
    assert!(verdict.evidence.person_frames.is_empty());
    assert_eq!(verdict.evidence.plant_frames.len(), 10);
    assert_eq!(verdict.evidence.heuristic_plant_frames.len(), 10);
    Ok(())
}

#[test]
fn scenario_b_worker_on_bare_soil_fails_on_plant() -> Result<()> {
    let verdict = run_scene("worker")?;
    assert!(!verdict.passed);
    assert_eq!(verdict.reason(), Reason::NoPlantDetected);
    assert_eq!(verdict.evidence.person_frames, (0..10).collect::<Vec<_>>());
    assert!(verdict.evidence.plant_frames.is_empty());
    Ok(())
}

#[test]
fn scenario_c_static_planting_fails_on_motion() -> Result<()> {
    let verdict = run_scene("idle-planting")?;
    assert!(!verdict.passed);
    assert_eq!(verdict.reason(), Reason::InsufficientGroundMotion);
    assert_eq!(verdict.evidence.person_frames.len(), 10);
    assert_eq!(verdict.evidence.plant_frames.len(), 10);
    assert_eq!(verdict.evidence.avg_motion, 0.0);
    Ok(())
}

#[test]
fn scenario_d_planting_passes() -> Result<()> {
    let verdict = run_scene("planting")?;
    assert!(verdict.passed, "evidence: {:?}", verdict.evidence);
    assert_eq!(verdict.reason(), Reason::PlantingVerified);
    assert!(verdict.evidence.avg_motion >= 0.1);
    assert!(verdict.evidence.motion_samples.iter().all(|m| *m >= 0.0));
    Ok(())
}

#[test]
fn default_configuration_decides_every_scenario() -> Result<()> {
    let expected = [
        ("lawn", Reason::NoPersonDetected),
        ("worker", Reason::NoPlantDetected),
        ("idle-planting", Reason::InsufficientGroundMotion),
        ("planting", Reason::PlantingVerified),
    ];
    for (scene, reason) in expected {
        let scratch = Scratch::new()?;
        let mut config = VerifierConfig::default();
        config.storage.work_root = Some(scratch.root.path().to_path_buf());
        let threshold = config.thresholds.motion_threshold;
        let mut verifier = stub_verifier(config);

        let verdict = verifier.verify_path(&format!("stub://{}", scene))?;
        assert_eq!(verdict.reason(), reason, "{}: {:?}", scene, verdict.evidence);
        assert_eq!(verdict.evidence.num_frames, 10, "{}", scene);
        assert!(scratch.is_empty()?, "{}: frame directory left behind", scene);
        match reason {
            Reason::InsufficientGroundMotion => assert_eq!(verdict.evidence.avg_motion, 0.0),
            Reason::PlantingVerified => assert!(verdict.evidence.avg_motion >= threshold),
            _ => {}
        }
    }
    Ok(())
}

#[test]
fn planting_request_awards_points() -> Result<()> {
    let scratch = Scratch::new()?;
    let mut verifier = stub_verifier(scratch.config());
    let response = verifier.verify_request(
        "stub://planting",
        Some(GeoPoint {
            lat: -1.2921,
            lon: 36.8219,
        }),
    )?;
    assert_eq!(response.status, Status::Success);
    assert_eq!(response.points_awarded, Some(POINTS_AWARDED));
    assert!(response.confidence >= 0.5 && response.confidence <= 0.95);
    assert_eq!(response.reason, "planting verified");
    Ok(())
}

#[test]
fn embedded_geotag_satisfies_location_gate() -> Result<()> {
    let scratch = Scratch::new()?;
    let mut verifier = stub_verifier(scratch.config());
    let video = SyntheticVideo::new(Some(25.0), 50, |_| RgbImage::new(32, 32))
        .with_geotag("+48.8577+002.2950+035.000/");
    let source = VideoSource::synthetic(video);
    assert_eq!(source.geotag().as_deref(), Some("+48.8577+002.2950+035.000/"));

    let verdict = verifier.verify(source)?;
    assert_eq!(verdict.reason(), Reason::NoPersonDetected);
    Ok(())
}

#[test]
fn max_frames_bounds_sampling() -> Result<()> {
    let scratch = Scratch::new()?;
    let mut config = scratch.config();
    config.sampling.max_frames = Some(4);
    let mut verifier = stub_verifier(config);
    let verdict = verifier.verify_path("stub://planting")?;
    assert_eq!(verdict.evidence.num_frames, 4);
    assert_eq!(verdict.evidence.motion_samples.len(), 3);
    assert!(scratch.is_empty()?);
    Ok(())
}

struct CountingBackend {
    calls: Arc<AtomicUsize>,
}

impl DetectorBackend for CountingBackend {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

#[test]
fn empty_video_fails_without_detector_calls() -> Result<()> {
    let scratch = Scratch::new()?;
    let calls = Arc::new(AtomicUsize::new(0));
    let detector = ObjectDetector::active(Box::new(CountingBackend {
        calls: Arc::clone(&calls),
    }));
    let mut verifier = PlantingVerifier::new(scratch.config(), detector);

    let empty = SyntheticVideo::new(Some(25.0), 0, |_| RgbImage::new(8, 8));
    let verdict = verifier.verify(VideoSource::synthetic(empty))?;
    assert!(!verdict.passed);
    assert_eq!(verdict.reason(), Reason::NoFramesExtracted);
    assert_eq!(verdict.evidence.num_frames, 0);
    assert!(verdict.evidence.motion_samples.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(scratch.is_empty()?);
    Ok(())
}

#[test]
fn unavailable_detector_still_reports_vegetation() -> Result<()> {
    let scratch = Scratch::new()?;
    let mut verifier =
        PlantingVerifier::new(scratch.config(), ObjectDetector::unavailable("no model"));
    let verdict = verifier.verify_path("stub://idle-planting")?;
    assert_eq!(verdict.reason(), Reason::NoPersonDetected);
    assert_eq!(verdict.evidence.detector, "unavailable");
    assert!(verdict.evidence.degraded_frames.is_empty());
    Ok(())
}

#[test]
fn missing_frame_rate_uses_default_rate() -> Result<()> {
    let scratch = Scratch::new()?;
    let mut verifier = stub_verifier(scratch.config());
    let video = SyntheticVideo::new(None, 100, |n| {
        RgbImage::from_pixel(32, 32, Rgb([n as u8, 90, 60]))
    });
    let verdict = verifier.verify(VideoSource::synthetic(video))?;
    assert_eq!(verdict.evidence.num_frames, 4);
    Ok(())
}
