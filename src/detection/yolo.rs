//! YOLO output decoding: raw tensor to scored boxes, class-aware NMS,
//! and mapping back to frame pixels.

use super::{BoundingBox, Detection};
use crate::config::DetectorConfig;
use crate::error::{Result, StreamguardError};
use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Class names of the COCO-trained YOLO checkpoints
pub const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

#[derive(Debug, Clone, PartialEq)]
pub struct YoloParams {
    /// Square model input side in pixels
    pub input_size: u32,
    /// Candidates scoring below this are dropped before NMS
    pub score_threshold: f32,
    /// Same-class boxes overlapping more than this are suppressed
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            score_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 100,
        }
    }
}

impl From<&DetectorConfig> for YoloParams {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            input_size: config.input_size,
            score_threshold: config.score_threshold,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections as usize,
        }
    }
}

/// Scored box in model input pixels, center format
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub score: f32,
    pub class_id: usize,
}

impl Candidate {
    fn corners(&self) -> (f32, f32, f32, f32) {
        (
            self.cx - self.w / 2.0,
            self.cy - self.h / 2.0,
            self.cx + self.w / 2.0,
            self.cy + self.h / 2.0,
        )
    }

    pub fn iou(&self, other: &Candidate) -> f32 {
        let (ax1, ay1, ax2, ay2) = self.corners();
        let (bx1, by1, bx2, by2) = other.corners();

        let inter_w = (ax2.min(bx2) - ax1.max(bx1)).max(0.0);
        let inter_h = (ay2.min(by2) - ay1.max(by1)).max(0.0);
        let inter = inter_w * inter_h;

        let union = self.w * self.h + other.w * other.h - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Decode a `[1, C, N]` or `[1, N, C]` prediction tensor.
///
/// `[1, 4 + classes, boxes]` is the transposed layout of current exports and
/// carries class scores only. `[1, boxes, 5 + classes]` is the classic
/// layout with an objectness column that scales every class score.
pub fn decode(output: &[f32], shape: &[usize], score_threshold: f32) -> Result<Vec<Candidate>> {
    let [batch, a, b] = shape else {
        return Err(StreamguardError::detector(format!(
            "unexpected detector output shape {:?}",
            shape
        )));
    };
    if *batch != 1 {
        return Err(StreamguardError::detector(format!(
            "detector expected batch=1 but received {}",
            batch
        )));
    }
    if output.len() != a * b {
        return Err(StreamguardError::detector(format!(
            "output holds {} values, shape {:?} needs {}",
            output.len(),
            shape,
            a * b
        )));
    }

    let candidates = if a <= b {
        decode_channels_first(output, *a, *b, score_threshold)?
    } else {
        decode_rows(output, *a, *b, score_threshold)?
    };
    debug!("Decoded {} candidates above {}", candidates.len(), score_threshold);
    Ok(candidates)
}

fn decode_channels_first(
    output: &[f32],
    channels: usize,
    boxes: usize,
    score_threshold: f32,
) -> Result<Vec<Candidate>> {
    if channels < 5 {
        return Err(StreamguardError::detector(format!(
            "detector output needs at least 5 channels (x, y, w, h, class), got {}",
            channels
        )));
    }

    let at = |channel: usize, i: usize| output[channel * boxes + i];
    let mut candidates = Vec::new();
    for i in 0..boxes {
        let (class_id, score) = best_class((4..channels).map(|c| at(c, i)));
        if score.is_finite() && score >= score_threshold {
            candidates.push(Candidate {
                cx: at(0, i),
                cy: at(1, i),
                w: at(2, i),
                h: at(3, i),
                score,
                class_id,
            });
        }
    }
    Ok(candidates)
}

fn decode_rows(
    output: &[f32],
    rows: usize,
    width: usize,
    score_threshold: f32,
) -> Result<Vec<Candidate>> {
    if width < 6 {
        return Err(StreamguardError::detector(format!(
            "detector rows need at least 6 values (x, y, w, h, obj, class), got {}",
            width
        )));
    }

    let mut candidates = Vec::new();
    for row in output.chunks_exact(width).take(rows) {
        let objectness = row[4];
        let (class_id, class_score) = best_class(row[5..].iter().copied());
        let score = objectness * class_score;
        if score.is_finite() && score >= score_threshold {
            candidates.push(Candidate {
                cx: row[0],
                cy: row[1],
                w: row[2],
                h: row[3],
                score,
                class_id,
            });
        }
    }
    Ok(candidates)
}

fn best_class<I: Iterator<Item = f32>>(scores: I) -> (usize, f32) {
    scores
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (class_id, score)| {
            if score > best.1 {
                (class_id, score)
            } else {
                best
            }
        })
}

/// Class-aware greedy NMS; the survivors come out in descending score order
pub fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if keep.len() >= max_detections {
            break;
        }
        let suppressed = keep
            .iter()
            .any(|kept| kept.class_id == candidate.class_id && kept.iou(&candidate) > iou_threshold);
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

/// Map candidates from model input space to frame pixels and attach labels.
///
/// Boxes that collapse to nothing once rounded are skipped.
pub fn to_detections(
    candidates: &[Candidate],
    scale_x: f32,
    scale_y: f32,
    labels: &[String],
) -> Vec<Detection> {
    candidates
        .iter()
        .filter_map(|c| {
            let (x1, y1, x2, y2) = c.corners();
            let bbox = BoundingBox::new(
                (x1 * scale_x).round() as i32,
                (y1 * scale_y).round() as i32,
                (x2 * scale_x).round() as i32,
                (y2 * scale_y).round() as i32,
            )
            .ok()?;
            let label = labels
                .get(c.class_id)
                .cloned()
                .unwrap_or_else(|| format!("class{}", c.class_id));
            Detection::new(label, c.score.clamp(0.0, 1.0), bbox).ok()
        })
        .collect()
}

pub fn coco_labels() -> Vec<String> {
    COCO_LABELS.iter().map(|label| label.to_string()).collect()
}

/// Read class names, one per line, blank lines ignored
pub fn load_labels<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let labels: Vec<String> = fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if labels.is_empty() {
        return Err(StreamguardError::detector(format!(
            "label file {} has no class names",
            path.display()
        )));
    }
    info!("Loaded {} class labels from {}", labels.len(), path.display());
    Ok(labels)
}
