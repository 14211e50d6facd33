//! verify_planting - verify a planting video and print the JSON response
//!
//! Accepts a local video file or a built-in synthetic scene (`stub://planting`,
//! `stub://idle-planting`, `stub://worker`, `stub://lawn`, `stub://blank`).

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use planting_verifier::{
    BackendKind, EvidenceLog, EvidenceRecord, GeoPoint, PlantingVerifier, SqliteEvidenceLog,
    VerifierConfig,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "verify_planting",
    about = "Verify that a video shows a person planting vegetation"
)]
struct Args {
    /// Video path or stub://<scene>
    #[arg(value_name = "VIDEO", required_unless_present = "demo")]
    video: Option<String>,

    /// Capture latitude (overrides the video geotag)
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Capture longitude (overrides the video geotag)
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Verify the configured demo video instead of VIDEO
    #[arg(long, conflicts_with = "video")]
    demo: bool,

    /// Config file (TOML, or JSON with a .json extension); defaults to $PLANTING_CONFIG
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Detector backend (auto|tract|stub|none)
    #[arg(long, value_name = "BACKEND")]
    backend: Option<String>,

    /// Append the response to this evidence log database
    #[arg(long, value_name = "PATH")]
    log_db: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::new(
        args.ui.parse()?,
        std::io::stderr().is_terminal(),
        !std::io::stdout().is_terminal(),
    );

    let mut config = match &args.config {
        Some(path) => VerifierConfig::load_from(path)?,
        None => VerifierConfig::load()?,
    };
    if let Some(backend) = &args.backend {
        config.detector.backend = backend.parse::<BackendKind>()?;
    }

    let video = if args.demo {
        config.storage.demo_video.to_string_lossy().into_owned()
    } else {
        args.video
            .clone()
            .ok_or_else(|| anyhow!("VIDEO is required unless --demo is given"))?
    };
    let supplied = match (args.lat, args.lon) {
        (Some(lat), Some(lon)) => Some(GeoPoint { lat, lon }),
        _ => None,
    };
    let log_db = args.log_db.clone().or_else(|| config.storage.evidence_db.clone());

    let mut verifier = {
        let _stage = ui.stage("Load detector");
        PlantingVerifier::from_config(config)
    };
    ui.note(&format!("detector: {}", verifier.detector().status()));

    let response = {
        let _stage = ui.stage("Verify video");
        verifier.verify_request(&video, supplied)?
    };

    if let Some(path) = log_db {
        let _stage = ui.stage("Append evidence log");
        let mut log = SqliteEvidenceLog::open(&path)?;
        let head = log.append(&EvidenceRecord::new(video.clone(), response.clone())?)?;
        ui.note(&format!("evidence log head: {}", hex::encode(head)));
    }

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
