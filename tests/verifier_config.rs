use std::io::Write;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use planting_verifier::config::{BackendKind, VerifierConfig};
use planting_verifier::FrameFormat;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PLANTING_CONFIG",
        "PLANTING_SAMPLE_FPS",
        "PLANTING_MAX_FRAMES",
        "PLANTING_MIN_PLANT_FRAMES",
        "PLANTING_MOTION_THRESHOLD",
        "PLANTING_MODEL_PATH",
        "PLANTING_BACKEND",
        "PLANTING_WORK_DIR",
        "PLANTING_FRAME_FORMAT",
    ] {
        std::env::remove_var(key);
    }
}

fn toml_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = VerifierConfig::load().expect("load defaults");
    assert_eq!(cfg, VerifierConfig::default());
}

#[test]
fn loads_toml_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = toml_file(
        r#"
        [sampling]
        sample_fps = 2
        max_frames = 30
        frame_format = "png"

        [detector]
        backend = "stub"
        model_path = "/opt/models/plants.onnx"

        [vegetation]
        roi_margin_px = 32
        min_area_frame = 1200

        [thresholds]
        min_plant_frames = 3
        motion_threshold = 0.8

        [gps]
        min_lat = -5.0
        max_lat = 5.0
        min_lon = 33.0
        max_lon = 42.0
        "#,
    );

    std::env::set_var("PLANTING_CONFIG", file.path());
    std::env::set_var("PLANTING_MOTION_THRESHOLD", "1.25");
    std::env::set_var("PLANTING_WORK_DIR", "/var/tmp/planting");

    let cfg = VerifierConfig::load().expect("load config");

    assert_eq!(cfg.sampling.sample_fps, 2);
    assert_eq!(cfg.sampling.max_frames, Some(30));
    assert_eq!(cfg.sampling.frame_format, FrameFormat::Png);
    assert_eq!(cfg.detector.backend, BackendKind::Stub);
    assert_eq!(
        cfg.detector.model_path,
        std::path::PathBuf::from("/opt/models/plants.onnx")
    );
    assert_eq!(cfg.vegetation.roi_margin_px, 32);
    assert_eq!(cfg.vegetation.min_area_frame, 1200);
    assert_eq!(cfg.vegetation.min_area_near_person, 150);
    assert_eq!(cfg.thresholds.min_plant_frames, 3);
    assert_eq!(cfg.thresholds.motion_threshold, 1.25);
    assert_eq!(
        cfg.storage.work_root,
        Some(std::path::PathBuf::from("/var/tmp/planting"))
    );
    assert_eq!(cfg.gps.allowed_region.max_lon, 42.0);

    clear_env();
}

#[test]
fn loads_json_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .expect("temp config");
    file.write_all(br#"{"thresholds": {"min_plant_frames": 2}, "motion": {"win_size": 21}}"#)
        .expect("write config");

    let cfg = VerifierConfig::load_from(file.path()).expect("load json config");
    assert_eq!(cfg.thresholds.min_plant_frames, 2);
    assert_eq!(cfg.motion.flow.win_size, 21);
    assert_eq!(cfg.motion.flow.levels, 3);
}

#[test]
fn invalid_env_override_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PLANTING_SAMPLE_FPS", "0");
    assert!(VerifierConfig::load().is_err());
    clear_env();

    std::env::set_var("PLANTING_MOTION_THRESHOLD", "fast");
    assert!(VerifierConfig::load().is_err());
    clear_env();

    std::env::set_var("PLANTING_BACKEND", "cuda");
    assert!(VerifierConfig::load().is_err());
    clear_env();
}

#[test]
fn invalid_file_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = toml_file(
        r#"
        [detector]
        confidence_threshold = 1.5
        "#,
    );
    assert!(VerifierConfig::load_from(file.path()).is_err());

    let file = toml_file("[thresholds]\nmin_plant_frames = 0\n");
    assert!(VerifierConfig::load_from(file.path()).is_err());
}

#[test]
fn zero_max_frames_env_lifts_the_bound() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PLANTING_MAX_FRAMES", "0");
    let cfg = VerifierConfig::load().expect("load config");
    assert_eq!(cfg.sampling.max_frames, None);
    clear_env();
}

#[test]
fn unsupported_flow_polynomial_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = toml_file("[motion]\npoly_n = 4\n");
    assert!(VerifierConfig::load_from(file.path()).is_err());

    let file = toml_file("[motion]\nwin_size = 14\n");
    assert!(VerifierConfig::load_from(file.path()).is_err());
}
