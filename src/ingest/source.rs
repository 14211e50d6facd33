use anyhow::Result;
use image::RgbImage;

#[cfg(feature = "decode-ffmpeg")]
use super::file_ffmpeg::FfmpegVideo;
use super::synthetic::{Scene, SyntheticVideo};
use super::NoFrames;

/// A decodable video.
pub struct VideoSource {
    label: String,
    backend: SourceBackend,
}

enum SourceBackend {
    Synthetic(SyntheticVideo),
    #[cfg(feature = "decode-ffmpeg")]
    Ffmpeg(FfmpegVideo),
}

impl VideoSource {
    /// Open a local video file or a `stub://<scene>` synthetic scene.
    ///
    /// Every failure here is a `NoFrames` error.
    pub fn open(path: &str) -> Result<Self> {
        if !is_local_file_path(path) {
            return Err(NoFrames::new(format!(
                "'{}' is not a local video path (no URL schemes)",
                path
            ))
            .into());
        }
        if let Some(name) = path.strip_prefix("stub://") {
            let scene: Scene = name
                .parse()
                .map_err(|e: anyhow::Error| NoFrames::new(e.to_string()))?;
            log::info!("VideoSource: opened {} (synthetic)", path);
            return Ok(Self {
                label: path.to_string(),
                backend: SourceBackend::Synthetic(SyntheticVideo::scene(scene)),
            });
        }

        #[cfg(feature = "decode-ffmpeg")]
        {
            let video = FfmpegVideo::open(path)
                .map_err(|e| NoFrames::new(format!("cannot open video: {:#}", e)))?;
            log::info!("VideoSource: opened {} (ffmpeg)", path);
            Ok(Self {
                label: path.to_string(),
                backend: SourceBackend::Ffmpeg(video),
            })
        }
        #[cfg(not(feature = "decode-ffmpeg"))]
        {
            Err(NoFrames::new(format!(
                "cannot open '{}': video decoding requires the decode-ffmpeg feature",
                path
            ))
            .into())
        }
    }

    pub fn synthetic(video: SyntheticVideo) -> Self {
        Self {
            label: "synthetic".to_string(),
            backend: SourceBackend::Synthetic(video),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Frame rate reported by the container, if any.
    pub fn frame_rate(&self) -> Option<f64> {
        match &self.backend {
            SourceBackend::Synthetic(video) => video.frame_rate(),
            #[cfg(feature = "decode-ffmpeg")]
            SourceBackend::Ffmpeg(video) => video.frame_rate(),
        }
    }

    /// Embedded location metadata, when the container carries one.
    pub fn geotag(&self) -> Option<String> {
        match &self.backend {
            SourceBackend::Synthetic(video) => video.geotag().map(str::to_string),
            #[cfg(feature = "decode-ffmpeg")]
            SourceBackend::Ffmpeg(video) => video.geotag().map(str::to_string),
        }
    }

    /// Decode the next frame; `Ok(None)` at end of stream.
    pub fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        match &mut self.backend {
            SourceBackend::Synthetic(video) => Ok(video.next_frame()),
            #[cfg(feature = "decode-ffmpeg")]
            SourceBackend::Ffmpeg(video) => video.next_frame(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_no_frames(result: Result<VideoSource>) -> bool {
        match result {
            Err(err) => err.downcast_ref::<NoFrames>().is_some(),
            Ok(_) => false,
        }
    }

    #[test]
    fn opens_stub_scene() -> Result<()> {
        let mut source = VideoSource::open("stub://worker")?;
        assert_eq!(source.frame_rate(), Some(25.0));
        assert_eq!(source.label(), "stub://worker");
        let frame = source.next_frame()?.expect("first frame");
        assert_eq!(frame.dimensions(), (320, 240));
        Ok(())
    }

    #[test]
    fn rejects_remote_and_unknown_sources() {
        assert!(is_no_frames(VideoSource::open("rtsp://camera/stream")));
        assert!(is_no_frames(VideoSource::open("stub://orchard")));
        assert!(is_no_frames(VideoSource::open("")));
    }

    #[cfg(not(feature = "decode-ffmpeg"))]
    #[test]
    fn files_need_decoder_feature() {
        assert!(is_no_frames(VideoSource::open("/tmp/video.mp4")));
    }
}
