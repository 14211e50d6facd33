use anyhow::{Context, Result};
use std::path::Path;

use super::source::VideoSource;
use super::NoFrames;
use crate::config::SamplingSettings;
use crate::frame::SampledFrame;

/// Frames to skip between kept frames: `max(1, round(source_fps / sample_fps))`.
///
/// A missing, non-finite or non-positive `source_fps` falls back to `default_fps`.
pub fn decimation_step(source_fps: Option<f64>, sample_fps: u32, default_fps: f64) -> usize {
    let fps = source_fps
        .filter(|fps| fps.is_finite() && *fps > 0.0)
        .unwrap_or(default_fps);
    let step = (fps / f64::from(sample_fps.max(1))).round();
    if step.is_finite() && step >= 1.0 {
        step as usize
    } else {
        1
    }
}

/// Decode `source` and write every `step`-th frame into `output_dir`.
///
/// Stops at `max_frames` saved frames or end of stream. Returns `NoFrames` when
/// nothing was saved; a decode error after the first frame ends the stream
/// early. Failures writing frames are returned as-is.
pub fn extract_frames(
    source: &mut VideoSource,
    output_dir: &Path,
    settings: &SamplingSettings,
) -> Result<Vec<SampledFrame>> {
    let source_fps = source
        .frame_rate()
        .filter(|fps| fps.is_finite() && *fps > 0.0)
        .unwrap_or(settings.default_source_fps);
    let step = decimation_step(
        Some(source_fps),
        settings.sample_fps,
        settings.default_source_fps,
    );
    log::info!(
        "sampling {} at {:.2} fps, keeping every {} frame(s)",
        source.label(),
        source_fps,
        step
    );

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create frame directory {}", output_dir.display()))?;

    let mut frames: Vec<SampledFrame> = Vec::new();
    let mut decoded: usize = 0;
    loop {
        if settings.max_frames.is_some_and(|max| frames.len() >= max) {
            break;
        }
        let image = match source.next_frame() {
            Ok(Some(image)) => image,
            Ok(None) => break,
            Err(err) if decoded == 0 => {
                return Err(NoFrames::new(format!("decode failed: {:#}", err)).into());
            }
            Err(err) => {
                log::warn!(
                    "decode error after {} frames of {}, stopping: {:#}",
                    decoded,
                    source.label(),
                    err
                );
                break;
            }
        };
        let source_index = decoded;
        decoded += 1;
        if source_index % step != 0 {
            continue;
        }

        let index = frames.len();
        let path = output_dir.join(SampledFrame::file_name(index, settings.frame_format));
        image
            .save_with_format(&path, settings.frame_format.image_format())
            .with_context(|| format!("failed to write frame {}", path.display()))?;
        frames.push(SampledFrame {
            index,
            path,
            timestamp_secs: source_index as f64 / source_fps,
        });
    }

    if frames.is_empty() {
        return Err(NoFrames::new(format!("{} yielded no decodable frames", source.label())).into());
    }
    log::info!(
        "sampled {} frame(s) from {} decoded",
        frames.len(),
        decoded
    );
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameFormat;
    use crate::ingest::SyntheticVideo;
    use image::{Rgb, RgbImage};

    fn settings(sample_fps: u32, max_frames: Option<usize>) -> SamplingSettings {
        SamplingSettings {
            sample_fps,
            max_frames,
            frame_format: FrameFormat::Png,
            ..SamplingSettings::default()
        }
    }

    fn counter_video(fps: Option<f64>, frames: u64) -> VideoSource {
        VideoSource::synthetic(SyntheticVideo::new(fps, frames, |n| {
            RgbImage::from_pixel(8, 8, Rgb([n as u8, 0, 0]))
        }))
    }

    #[test]
    fn step_is_rounded_and_at_least_one() {
        assert_eq!(decimation_step(Some(25.0), 1, 25.0), 25);
        assert_eq!(decimation_step(Some(29.97), 2, 25.0), 15);
        assert_eq!(decimation_step(Some(10.0), 30, 25.0), 1);
        assert_eq!(decimation_step(None, 5, 25.0), 5);
        assert_eq!(decimation_step(Some(0.0), 1, 25.0), 25);
        assert_eq!(decimation_step(Some(f64::NAN), 1, 25.0), 25);
    }

    #[test]
    fn keeps_every_step_frame_in_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut source = counter_video(Some(10.0), 50);
        let frames = extract_frames(&mut source, dir.path(), &settings(2, None))?;
        assert_eq!(frames.len(), 10);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index, i);
            assert_eq!(frame.timestamp_secs, (i * 5) as f64 / 10.0);
            let image = frame.load_rgb()?;
            assert_eq!(image.get_pixel(0, 0)[0], (i * 5) as u8);
        }
        Ok(())
    }

    #[test]
    fn stops_at_max_frames() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut source = counter_video(Some(25.0), 250);
        let frames = extract_frames(&mut source, dir.path(), &settings(25, Some(7)))?;
        assert_eq!(frames.len(), 7);
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 7);
        Ok(())
    }

    #[test]
    fn missing_frame_rate_uses_default() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut source = counter_video(None, 100);
        let frames = extract_frames(&mut source, dir.path(), &settings(1, None))?;
        assert_eq!(frames.len(), 4);
        Ok(())
    }

    #[test]
    fn empty_video_is_no_frames() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut source = counter_video(Some(25.0), 0);
        let err = extract_frames(&mut source, dir.path(), &settings(1, None))
            .expect_err("empty video must fail");
        assert!(err.downcast_ref::<NoFrames>().is_some());
        Ok(())
    }
}
