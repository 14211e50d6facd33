//! Synthetic videos for tests and demos.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use std::str::FromStr;

use crate::detect::PERSON_MARKER;

const SCENE_WIDTH: u32 = 320;
const SCENE_HEIGHT: u32 = 240;
const SCENE_FPS: f64 = 25.0;
const SCENE_FRAMES: u64 = 250;

const SOIL: Rgb<u8> = Rgb([110, 85, 60]);
const GRASS: Rgb<u8> = Rgb([60, 150, 50]);
const SAPLING: Rgb<u8> = Rgb([40, 160, 40]);

/// Caller-rendered frame sequence.
pub struct SyntheticVideo {
    fps: Option<f64>,
    frame_count: u64,
    next_index: u64,
    geotag: Option<String>,
    render: Box<dyn FnMut(u64) -> RgbImage + Send>,
}

impl SyntheticVideo {
    /// `fps = None` models a container that does not report its frame rate.
    pub fn new<F>(fps: Option<f64>, frame_count: u64, render: F) -> Self
    where
        F: FnMut(u64) -> RgbImage + Send + 'static,
    {
        Self {
            fps,
            frame_count,
            next_index: 0,
            geotag: None,
            render: Box::new(render),
        }
    }

    /// Attach an embedded location tag (ISO 6709 text).
    pub fn with_geotag(mut self, tag: impl Into<String>) -> Self {
        self.geotag = Some(tag.into());
        self
    }

    pub fn scene(scene: Scene) -> Self {
        Self::new(Some(SCENE_FPS), SCENE_FRAMES, move |n| scene.render(n))
    }

    pub fn frame_rate(&self) -> Option<f64> {
        self.fps
    }

    pub fn geotag(&self) -> Option<&str> {
        self.geotag.as_deref()
    }

    pub(crate) fn next_frame(&mut self) -> Option<RgbImage> {
        if self.next_index >= self.frame_count {
            return None;
        }
        let frame = (self.render)(self.next_index);
        self.next_index += 1;
        Some(frame)
    }
}

/// Built-in scenes, 10 s at 25 fps, 320x240.
///
/// The worker is drawn in the stub detector's person marker colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scene {
    /// Bare soil.
    Blank,
    /// Uniform grass, nobody in frame.
    Lawn,
    /// Worker standing on bare soil.
    Worker,
    /// Worker next to a sapling, nothing moves.
    IdlePlanting,
    /// Worker next to a sapling with a hand moving near the ground.
    Planting,
}

impl Scene {
    pub const ALL: [Scene; 5] = [
        Scene::Blank,
        Scene::Lawn,
        Scene::Worker,
        Scene::IdlePlanting,
        Scene::Planting,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scene::Blank => "blank",
            Scene::Lawn => "lawn",
            Scene::Worker => "worker",
            Scene::IdlePlanting => "idle-planting",
            Scene::Planting => "planting",
        }
    }

    pub fn render(self, n: u64) -> RgbImage {
        let background = match self {
            Scene::Lawn => GRASS,
            _ => SOIL,
        };
        let mut frame = RgbImage::from_pixel(SCENE_WIDTH, SCENE_HEIGHT, background);
        if matches!(self, Scene::Worker | Scene::IdlePlanting | Scene::Planting) {
            fill(&mut frame, 120, 20, 80, 120, Rgb(PERSON_MARKER));
        }
        if matches!(self, Scene::IdlePlanting | Scene::Planting) {
            fill(&mut frame, 145, 165, 30, 50, SAPLING);
        }
        if self == Scene::Planting {
            // Moves 6 px every second of video.
            let x0 = 125 + ((n / 25) % 6) as u32 * 6;
            draw_hand(&mut frame, x0, 95);
        }
        frame
    }
}

impl FromStr for Scene {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Scene::ALL
            .into_iter()
            .find(|scene| scene.name() == s)
            .ok_or_else(|| anyhow!("unknown synthetic scene '{}'", s))
    }
}

fn fill(frame: &mut RgbImage, x0: u32, y0: u32, w: u32, h: u32, color: Rgb<u8>) {
    for y in y0..(y0 + h).min(frame.height()) {
        for x in x0..(x0 + w).min(frame.width()) {
            frame.put_pixel(x, y, color);
        }
    }
}

/// 40x30 skin-toned patch with a blocky texture that moves with the patch.
fn draw_hand(frame: &mut RgbImage, x0: u32, y0: u32) {
    for dy in 0..30u32 {
        for dx in 0..40u32 {
            let (x, y) = (x0 + dx, y0 + dy);
            if x >= frame.width() || y >= frame.height() {
                continue;
            }
            let cell = (dx / 4).wrapping_mul(73_856_093) ^ (dy / 4).wrapping_mul(19_349_663);
            let shade = (cell.wrapping_mul(2_654_435_761) >> 26) as u8;
            frame.put_pixel(
                x,
                y,
                Rgb([
                    170u8.saturating_add(shade),
                    120u8.saturating_add(shade),
                    90u8.saturating_add(shade / 2),
                ]),
            );
        }
    }
}
