//! YOLO inference through tract; enabled with the `onnx` feature.

use super::yolo::{self, YoloParams};
use super::{Detection, Detector};
use crate::error::{Result, StreamguardError};
use crate::frame::Frame;
use image::imageops::{self, FilterType};
use std::path::Path;
use tracing::{debug, info};
use tract_onnx::prelude::*;

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// ONNX YOLO model with letterbox-free square input
pub struct OnnxDetector {
    model: OnnxPlan,
    params: YoloParams,
    labels: Vec<String>,
}

impl OnnxDetector {
    /// Load and optimize the model for a `[1, 3, size, size]` f32 input
    pub fn load<P: AsRef<Path>>(model_path: P, params: YoloParams, labels: Vec<String>) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = params.input_size as usize;

        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .and_then(|model| {
                model.with_input_fact(
                    0,
                    InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
                )
            })
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| {
                StreamguardError::detector(format!(
                    "failed to load ONNX model {}: {}",
                    model_path.display(),
                    e
                ))
            })?;

        info!(
            "Loaded ONNX model {} (input {}x{}, {} labels)",
            model_path.display(),
            size,
            size,
            labels.len()
        );
        Ok(Self {
            model,
            params,
            labels,
        })
    }

    fn input_tensor(&self, frame: &Frame) -> Tensor {
        let size = self.params.input_size;
        let resized = imageops::resize(&frame.image, size, size, FilterType::Triangle);
        let side = size as usize;

        tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, channel, y, x)| {
            resized.get_pixel(x as u32, y as u32).0[channel] as f32 / 255.0
        })
        .into_tensor()
    }
}

impl Detector for OnnxDetector {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.input_tensor(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| StreamguardError::detector(format!("ONNX inference failed: {}", e)))?;

        let output = outputs
            .first()
            .ok_or_else(|| StreamguardError::detector("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| StreamguardError::detector(format!("model output was not f32: {}", e)))?;
        let shape = view.shape().to_vec();
        let values: Vec<f32> = view.iter().copied().collect();

        let candidates = yolo::decode(&values, &shape, self.params.score_threshold)?;
        let kept = yolo::non_max_suppression(
            candidates,
            self.params.iou_threshold,
            self.params.max_detections,
        );

        let size = self.params.input_size as f32;
        let detections = yolo::to_detections(
            &kept,
            frame.width() as f32 / size,
            frame.height() as f32 / size,
            &self.labels,
        );
        debug!("ONNX detector kept {} boxes", detections.len());
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_detector_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = OnnxDetector::load(
            dir.path().join("yolov8n.onnx"),
            YoloParams::default(),
            yolo::coco_labels(),
        );

        assert!(matches!(result, Err(StreamguardError::Detector { .. })));
    }

    #[test]
    fn test_garbage_model_is_detector_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.onnx");
        std::fs::write(&path, b"not a protobuf").unwrap();

        let result = OnnxDetector::load(&path, YoloParams::default(), yolo::coco_labels());

        assert!(matches!(result, Err(StreamguardError::Detector { .. })));
    }
}
