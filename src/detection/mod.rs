use crate::config::DetectorConfig;
use crate::error::{Result, StreamguardError};
use crate::frame::Frame;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::info;

#[cfg(feature = "onnx")]
pub mod onnx;
pub mod yolo;

#[cfg(feature = "onnx")]
pub use onnx::OnnxDetector;

/// Axis-aligned box in integer pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Create a box, rejecting degenerate or inverted corners
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Result<Self> {
        if x1 >= x2 || y1 >= y2 {
            return Err(StreamguardError::detector(format!(
                "invalid bounding box ({}, {}, {}, {})",
                x1, y1, x2, y2
            )));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn width(&self) -> u32 {
        self.x2.abs_diff(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.abs_diff(self.y1)
    }
}

/// One labeled, confidence-scored box for a single frame
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new<S: Into<String>>(label: S, confidence: f32, bbox: BoundingBox) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(StreamguardError::detector(format!(
                "confidence {} outside [0, 1]",
                confidence
            )));
        }
        Ok(Self {
            label: label.into(),
            confidence,
            bbox,
        })
    }

    /// Text drawn next to the box
    pub fn caption(&self) -> String {
        format!("{} {:.2}", self.label, self.confidence)
    }
}

/// Object detection capability.
///
/// Implementations must treat the frame as read-only and keep no state that
/// changes results between calls. Order of the returned detections is kept
/// for rendering and logging.
pub trait Detector: Send {
    /// Backend identifier
    fn name(&self) -> &'static str;

    /// Run detection on a frame
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Detector that never reports anything
#[derive(Debug, Default)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn name(&self) -> &'static str {
        "none"
    }

    fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>> {
        Ok(Vec::new())
    }
}

/// Drops detections below a confidence floor, keeping the inner order
pub struct ConfidenceFilter<D> {
    inner: D,
    min_confidence: f32,
}

impl<D: Detector> ConfidenceFilter<D> {
    pub fn new(inner: D, min_confidence: f32) -> Self {
        Self {
            inner,
            min_confidence,
        }
    }
}

impl<D: Detector> Detector for ConfidenceFilter<D> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        let detections = self.inner.detect(frame)?;
        Ok(detections
            .into_iter()
            .filter(|d| d.confidence >= self.min_confidence)
            .collect())
    }
}

/// Build the configured detector behind the confidence floor
pub fn detector_from_config(config: &DetectorConfig) -> Result<Box<dyn Detector>> {
    let detector: Box<dyn Detector> = match config.kind.as_str() {
        "none" => Box::new(ConfidenceFilter::new(NullDetector, config.min_confidence)),
        "onnx" => onnx_detector(config)?,
        other => {
            return Err(StreamguardError::detector(format!(
                "Unknown detector kind '{}'",
                other
            )))
        }
    };
    info!(
        "Detector backend: {} (min confidence {})",
        detector.name(),
        config.min_confidence
    );
    Ok(detector)
}

#[cfg(feature = "onnx")]
fn onnx_detector(config: &DetectorConfig) -> Result<Box<dyn Detector>> {
    let model_path = config
        .model_path
        .as_deref()
        .ok_or_else(|| StreamguardError::detector("detector.model_path is required for kind 'onnx'"))?;
    let labels = match &config.labels_path {
        Some(path) => yolo::load_labels(path)?,
        None => yolo::coco_labels(),
    };

    let detector = OnnxDetector::load(model_path, yolo::YoloParams::from(config), labels)?;
    Ok(Box::new(ConfidenceFilter::new(detector, config.min_confidence)))
}

#[cfg(not(feature = "onnx"))]
fn onnx_detector(_config: &DetectorConfig) -> Result<Box<dyn Detector>> {
    Err(StreamguardError::detector(
        "detector kind 'onnx' requires building with the 'onnx' feature",
    ))
}

/// Replays pre-recorded per-frame results, one entry per call.
///
/// Once the script runs out every further frame yields no detections.
pub struct ScriptedDetector {
    script: Mutex<VecDeque<Result<Vec<Detection>>>>,
}

impl ScriptedDetector {
    pub fn new<I>(script: I) -> Self
    where
        I: IntoIterator<Item = Result<Vec<Detection>>>,
    {
        Self {
            script: Mutex::new(script.into_iter().collect()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

impl Detector for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.script.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}
