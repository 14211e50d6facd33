use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::frame::FrameFormat;
use crate::gps::BoundingRegion;
use crate::motion::FlowParams;

const DEFAULT_SAMPLE_FPS: u32 = 1;
const DEFAULT_MAX_FRAMES: usize = 60;
const DEFAULT_SOURCE_FPS: f64 = 25.0;
const DEFAULT_MODEL_PATH: &str = "models/yolov8n.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_IOU: f32 = 0.45;
const DEFAULT_ROI_MARGIN_PX: i32 = 20;
const DEFAULT_ROI_EXTENSION_PX: i32 = 30;
const DEFAULT_ROI_BELOW_FRACTION: f32 = 0.5;
const DEFAULT_MIN_AREA_NEAR_PERSON: u32 = 150;
const DEFAULT_MIN_AREA_FRAME: u32 = 800;
const DEFAULT_PERSON_BAND: f32 = 0.5;
const DEFAULT_MIN_PLANT_FRAMES: usize = 1;
const DEFAULT_MOTION_THRESHOLD: f32 = 0.6;
const DEFAULT_DEMO_VIDEO: &str = "uploads/videos/demo_video.mp4";

#[derive(Debug, Deserialize, Default)]
struct VerifierConfigFile {
    sampling: Option<SamplingConfigFile>,
    detector: Option<DetectorConfigFile>,
    vegetation: Option<VegetationConfigFile>,
    motion: Option<MotionConfigFile>,
    thresholds: Option<ThresholdsConfigFile>,
    storage: Option<StorageConfigFile>,
    gps: Option<GpsConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplingConfigFile {
    sample_fps: Option<u32>,
    max_frames: Option<usize>,
    default_source_fps: Option<f64>,
    frame_format: Option<FrameFormat>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct VegetationConfigFile {
    roi_margin_px: Option<i32>,
    roi_extension_px: Option<i32>,
    roi_below_fraction: Option<f32>,
    min_area_near_person: Option<u32>,
    min_area_frame: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct MotionConfigFile {
    pyr_scale: Option<f32>,
    levels: Option<u32>,
    win_size: Option<u32>,
    iterations: Option<u32>,
    poly_n: Option<u32>,
    poly_sigma: Option<f32>,
    person_band: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ThresholdsConfigFile {
    min_plant_frames: Option<usize>,
    motion_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct StorageConfigFile {
    work_root: Option<PathBuf>,
    frames_dir: Option<PathBuf>,
    evidence_db: Option<PathBuf>,
    demo_video: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct GpsConfigFile {
    min_lat: Option<f64>,
    max_lat: Option<f64>,
    min_lon: Option<f64>,
    max_lon: Option<f64>,
}

/// Full verifier configuration.
///
/// Thresholds and region-of-interest bounds are deployment tuning, never end-user input.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifierConfig {
    pub sampling: SamplingSettings,
    pub detector: DetectorSettings,
    pub vegetation: VegetationSettings,
    pub motion: MotionSettings,
    pub thresholds: Thresholds,
    pub storage: StorageSettings,
    pub gps: GpsSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplingSettings {
    /// Target frames per second to keep (>= 1).
    pub sample_fps: u32,
    /// Upper bound on saved frames; `None` keeps every sampled frame. A `0`
    /// in the config file or `PLANTING_MAX_FRAMES` means unbounded.
    pub max_frames: Option<usize>,
    /// Used when the container does not report a frame rate.
    pub default_source_fps: f64,
    pub frame_format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// Learned detector when it loads, otherwise unavailable.
    Auto,
    Tract,
    Stub,
    None,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendKind::Auto),
            "tract" => Ok(BackendKind::Tract),
            "stub" => Ok(BackendKind::Stub),
            "none" => Ok(BackendKind::None),
            other => Err(anyhow!(
                "unknown detector backend '{}' (expected auto|tract|stub|none)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub backend: BackendKind,
    pub model_path: PathBuf,
    pub labels_path: Option<PathBuf>,
    /// Square model input resolution.
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

/// Bounds of the person-anchored vegetation search.
#[derive(Debug, Clone, PartialEq)]
pub struct VegetationSettings {
    /// Horizontal dilation of the person box.
    pub roi_margin_px: i32,
    /// Extra rows below `roi_below_fraction` of the person height.
    pub roi_extension_px: i32,
    pub roi_below_fraction: f32,
    pub min_area_near_person: u32,
    pub min_area_frame: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotionSettings {
    pub flow: FlowParams,
    /// Bottom fraction of the person box used as motion ROI.
    pub person_band: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub min_plant_frames: usize,
    pub motion_threshold: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageSettings {
    /// Parent of per-run temporary frame directories (system temp dir if unset).
    pub work_root: Option<PathBuf>,
    /// Fixed frame directory, emptied before and removed after each run.
    pub frames_dir: Option<PathBuf>,
    pub evidence_db: Option<PathBuf>,
    pub demo_video: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpsSettings {
    pub allowed_region: BoundingRegion,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingSettings::default(),
            detector: DetectorSettings::default(),
            vegetation: VegetationSettings::default(),
            motion: MotionSettings::default(),
            thresholds: Thresholds::default(),
            storage: StorageSettings::default(),
            gps: GpsSettings {
                allowed_region: BoundingRegion::WORLD,
            },
        }
    }
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            sample_fps: DEFAULT_SAMPLE_FPS,
            max_frames: Some(DEFAULT_MAX_FRAMES),
            default_source_fps: DEFAULT_SOURCE_FPS,
            frame_format: FrameFormat::Jpeg,
        }
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Auto,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            labels_path: None,
            input_size: DEFAULT_INPUT_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE,
            iou_threshold: DEFAULT_IOU,
        }
    }
}

impl Default for VegetationSettings {
    fn default() -> Self {
        Self {
            roi_margin_px: DEFAULT_ROI_MARGIN_PX,
            roi_extension_px: DEFAULT_ROI_EXTENSION_PX,
            roi_below_fraction: DEFAULT_ROI_BELOW_FRACTION,
            min_area_near_person: DEFAULT_MIN_AREA_NEAR_PERSON,
            min_area_frame: DEFAULT_MIN_AREA_FRAME,
        }
    }
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            flow: FlowParams::default(),
            person_band: DEFAULT_PERSON_BAND,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_plant_frames: DEFAULT_MIN_PLANT_FRAMES,
            motion_threshold: DEFAULT_MOTION_THRESHOLD,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            work_root: None,
            frames_dir: None,
            evidence_db: None,
            demo_video: PathBuf::from(DEFAULT_DEMO_VIDEO),
        }
    }
}

impl VerifierConfig {
    /// Load from `$PLANTING_CONFIG` (TOML, or JSON for `.json` files), then apply
    /// `PLANTING_*` environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PLANTING_CONFIG").ok();
        match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Self::load_from(Path::new(path)),
            _ => {
                let mut cfg = Self::default();
                cfg.apply_env()?;
                cfg.validate()?;
                Ok(cfg)
            }
        }
    }

    /// Load from an explicit file, then apply environment overrides and validate.
    pub fn load_from(path: &Path) -> Result<Self> {
        let file_cfg = read_config_file(path)?;
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: VerifierConfigFile) -> Result<Self> {
        let defaults = Self::default();

        let sampling = file.sampling.unwrap_or_default();
        let sampling = SamplingSettings {
            sample_fps: sampling.sample_fps.unwrap_or(defaults.sampling.sample_fps),
            max_frames: match sampling.max_frames {
                Some(limit) => frame_limit(limit),
                None => defaults.sampling.max_frames,
            },
            default_source_fps: sampling
                .default_source_fps
                .unwrap_or(defaults.sampling.default_source_fps),
            frame_format: sampling
                .frame_format
                .unwrap_or(defaults.sampling.frame_format),
        };

        let detector = file.detector.unwrap_or_default();
        let backend = match detector.backend.as_deref() {
            Some(name) => name.parse()?,
            None => defaults.detector.backend,
        };
        let detector = DetectorSettings {
            backend,
            model_path: detector
                .model_path
                .unwrap_or(defaults.detector.model_path),
            labels_path: detector.labels_path,
            input_size: detector.input_size.unwrap_or(defaults.detector.input_size),
            confidence_threshold: detector
                .confidence_threshold
                .unwrap_or(defaults.detector.confidence_threshold),
            iou_threshold: detector
                .iou_threshold
                .unwrap_or(defaults.detector.iou_threshold),
        };

        let vegetation = file.vegetation.unwrap_or_default();
        let vegetation = VegetationSettings {
            roi_margin_px: vegetation
                .roi_margin_px
                .unwrap_or(defaults.vegetation.roi_margin_px),
            roi_extension_px: vegetation
                .roi_extension_px
                .unwrap_or(defaults.vegetation.roi_extension_px),
            roi_below_fraction: vegetation
                .roi_below_fraction
                .unwrap_or(defaults.vegetation.roi_below_fraction),
            min_area_near_person: vegetation
                .min_area_near_person
                .unwrap_or(defaults.vegetation.min_area_near_person),
            min_area_frame: vegetation
                .min_area_frame
                .unwrap_or(defaults.vegetation.min_area_frame),
        };

        let motion = file.motion.unwrap_or_default();
        let flow_defaults = defaults.motion.flow;
        let motion = MotionSettings {
            flow: FlowParams {
                pyr_scale: motion.pyr_scale.unwrap_or(flow_defaults.pyr_scale),
                levels: motion.levels.unwrap_or(flow_defaults.levels),
                win_size: motion.win_size.unwrap_or(flow_defaults.win_size),
                iterations: motion.iterations.unwrap_or(flow_defaults.iterations),
                poly_n: motion.poly_n.unwrap_or(flow_defaults.poly_n),
                poly_sigma: motion.poly_sigma.unwrap_or(flow_defaults.poly_sigma),
            },
            person_band: motion.person_band.unwrap_or(defaults.motion.person_band),
        };

        let thresholds = file.thresholds.unwrap_or_default();
        let thresholds = Thresholds {
            min_plant_frames: thresholds
                .min_plant_frames
                .unwrap_or(defaults.thresholds.min_plant_frames),
            motion_threshold: thresholds
                .motion_threshold
                .unwrap_or(defaults.thresholds.motion_threshold),
        };

        let storage = file.storage.unwrap_or_default();
        let storage = StorageSettings {
            work_root: storage.work_root,
            frames_dir: storage.frames_dir,
            evidence_db: storage.evidence_db,
            demo_video: storage.demo_video.unwrap_or(defaults.storage.demo_video),
        };

        let gps = file.gps.unwrap_or_default();
        let world = BoundingRegion::WORLD;
        let gps = GpsSettings {
            allowed_region: BoundingRegion {
                min_lat: gps.min_lat.unwrap_or(world.min_lat),
                max_lat: gps.max_lat.unwrap_or(world.max_lat),
                min_lon: gps.min_lon.unwrap_or(world.min_lon),
                max_lon: gps.max_lon.unwrap_or(world.max_lon),
            },
        };

        Ok(Self {
            sampling,
            detector,
            vegetation,
            motion,
            thresholds,
            storage,
            gps,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(fps) = env_parse::<u32>("PLANTING_SAMPLE_FPS")? {
            self.sampling.sample_fps = fps;
        }
        if let Some(max_frames) = env_parse::<usize>("PLANTING_MAX_FRAMES")? {
            self.sampling.max_frames = frame_limit(max_frames);
        }
        if let Some(min_plant_frames) = env_parse::<usize>("PLANTING_MIN_PLANT_FRAMES")? {
            self.thresholds.min_plant_frames = min_plant_frames;
        }
        if let Some(threshold) = env_parse::<f32>("PLANTING_MOTION_THRESHOLD")? {
            self.thresholds.motion_threshold = threshold;
        }
        if let Some(backend) = env_nonempty("PLANTING_BACKEND") {
            self.detector.backend = backend.parse()?;
        }
        if let Some(path) = env_nonempty("PLANTING_MODEL_PATH") {
            self.detector.model_path = PathBuf::from(path);
        }
        if let Some(path) = env_nonempty("PLANTING_WORK_DIR") {
            self.storage.work_root = Some(PathBuf::from(path));
        }
        if let Some(format) = env_nonempty("PLANTING_FRAME_FORMAT") {
            self.sampling.frame_format = FrameFormat::parse(&format)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sampling.sample_fps == 0 {
            return Err(anyhow!("sample_fps must be >= 1"));
        }
        if self.sampling.max_frames == Some(0) {
            return Err(anyhow!("max_frames must be >= 1"));
        }
        if !(self.sampling.default_source_fps.is_finite() && self.sampling.default_source_fps > 0.0)
        {
            return Err(anyhow!("default_source_fps must be a positive number"));
        }
        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(anyhow!("confidence_threshold must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.detector.iou_threshold) {
            return Err(anyhow!("iou_threshold must be within [0, 1]"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector input_size must be > 0"));
        }
        if self.thresholds.min_plant_frames == 0 {
            return Err(anyhow!("min_plant_frames must be >= 1"));
        }
        let threshold = self.thresholds.motion_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(anyhow!("motion_threshold must be a finite, non-negative number"));
        }
        for (name, value) in [
            ("roi_below_fraction", self.vegetation.roi_below_fraction),
            ("person_band", self.motion.person_band),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1]", name));
            }
        }
        self.motion.flow.validate()?;
        self.gps.allowed_region.validate()?;
        Ok(())
    }
}

fn frame_limit(max_frames: usize) -> Option<usize> {
    (max_frames > 0).then_some(max_frames)
}

fn read_config_file(path: &Path) -> Result<VerifierConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env_nonempty(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} has an invalid value '{}'", key, value)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = VerifierConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.sampling.sample_fps, 1);
        assert_eq!(cfg.sampling.max_frames, Some(60));
        assert_eq!(cfg.thresholds.min_plant_frames, 1);
        assert_eq!(cfg.thresholds.motion_threshold, 0.6);
        assert_eq!(cfg.detector.confidence_threshold, 0.25);
    }

    #[test]
    fn rejects_zero_sample_fps() {
        let mut cfg = VerifierConfig::default();
        cfg.sampling.sample_fps = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_negative_motion_threshold() {
        let mut cfg = VerifierConfig::default();
        cfg.thresholds.motion_threshold = -0.1;
        assert!(cfg.validate().is_err());
        cfg.thresholds.motion_threshold = f32::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_backend_kind() {
        assert_eq!("Stub".parse::<BackendKind>().unwrap(), BackendKind::Stub);
        assert_eq!(" auto ".parse::<BackendKind>().unwrap(), BackendKind::Auto);
        assert!("yolo".parse::<BackendKind>().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let file: VerifierConfigFile = toml::from_str(
            r#"
            [thresholds]
            motion_threshold = 0.9

            [vegetation]
            roi_margin_px = 40
            "#,
        )
        .unwrap();
        let cfg = VerifierConfig::from_file(file).unwrap();
        assert_eq!(cfg.thresholds.motion_threshold, 0.9);
        assert_eq!(cfg.thresholds.min_plant_frames, 1);
        assert_eq!(cfg.vegetation.roi_margin_px, 40);
        assert_eq!(cfg.vegetation.roi_extension_px, 30);
        assert_eq!(cfg.sampling, SamplingSettings::default());
    }

    #[test]
    fn zero_max_frames_means_unbounded() {
        let file: VerifierConfigFile = toml::from_str(
            r#"
            [sampling]
            max_frames = 0
            "#,
        )
        .unwrap();
        let cfg = VerifierConfig::from_file(file).unwrap();
        assert_eq!(cfg.sampling.max_frames, None);
        cfg.validate().unwrap();
    }

    #[test]
    fn farneback_polynomial_is_configurable() {
        let file: VerifierConfigFile = toml::from_str(
            r#"
            [motion]
            poly_n = 7
            poly_sigma = 1.5
            "#,
        )
        .unwrap();
        let cfg = VerifierConfig::from_file(file).unwrap();
        assert_eq!(cfg.motion.flow.poly_n, 7);
        assert_eq!(cfg.motion.flow.poly_sigma, 1.5);
        assert_eq!(cfg.motion.flow.win_size, 15);
        cfg.validate().unwrap();
    }
}
