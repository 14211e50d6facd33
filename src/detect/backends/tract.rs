#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::labels::LabelTable;
use crate::detect::result::{non_max_suppression, Detection};
use crate::frame::BoundingBox;

/// Tract-based backend for YOLOv8-style ONNX detectors.
///
/// Expects a `[1, 3, size, size]` input and a `[1, 4 + classes, anchors]`
/// output of centre/size boxes followed by per-class scores. Frames are
/// resized to the model input; boxes are mapped back to frame pixels.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
    labels: LabelTable,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)))
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            labels: LabelTable::coco(),
        })
    }

    pub fn with_thresholds(mut self, confidence: f32, iou: f32) -> Self {
        self.confidence_threshold = confidence;
        self.iou_threshold = iou;
        self
    }

    pub fn with_labels(mut self, labels: LabelTable) -> Self {
        self.labels = labels;
        self
    }

    fn build_input(&self, frame: &RgbImage) -> Tensor {
        let size = self.input_size;
        let resized = imageops::resize(frame, size, size, FilterType::Triangle);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, size as usize, size as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        input.into_tensor()
    }

    fn decode(&self, outputs: TVec<TValue>, width: u32, height: u32) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let view = view
            .into_dimensionality::<tract_ndarray::Ix3>()
            .map_err(|e| anyhow!("unexpected model output shape: {}", e))?;
        let (_, rows, anchors) = view.dim();
        if rows <= 4 {
            return Err(anyhow!("model output has {} rows, expected > 4", rows));
        }

        let scale_x = width as f32 / self.input_size as f32;
        let scale_y = height as f32 / self.input_size as f32;
        let mut detections = Vec::new();
        for anchor in 0..anchors {
            let mut best_class = 0usize;
            let mut best_score = f32::NEG_INFINITY;
            for class in 0..rows - 4 {
                let score = view[[0, 4 + class, anchor]];
                if score > best_score {
                    best_score = score;
                    best_class = class;
                }
            }
            if best_score.is_nan() || best_score < self.confidence_threshold {
                continue;
            }
            let cx = view[[0, 0, anchor]] * scale_x;
            let cy = view[[0, 1, anchor]] * scale_y;
            let w = view[[0, 2, anchor]] * scale_x;
            let h = view[[0, 3, anchor]] * scale_y;
            let Some(bbox) = BoundingBox::clipped(
                cx - w / 2.0,
                cy - h / 2.0,
                cx + w / 2.0,
                cy + h / 2.0,
                width,
                height,
            ) else {
                continue;
            };
            detections.push(Detection::new(
                self.labels.name(best_class),
                best_score,
                bbox,
            ));
        }
        Ok(non_max_suppression(detections, self.iou_threshold))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame.width(), frame.height())
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::new(self.input_size, self.input_size);
        self.detect(&blank).map(|_| ())
    }
}
