use crate::detection::Detection;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use std::fs;
use tracing::{debug, warn};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const COUNTER_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const RECONNECT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

const BOX_THICKNESS: i32 = 2;
const BANNER_THICKNESS: i32 = 3;
const RECONNECT_TEXT: &str = "Reconnecting...";

/// Draws detections, counters and status banners onto frames.
///
/// Text needs a TrueType font; without one only the geometric parts
/// (boxes, banner border) are drawn.
pub struct Annotator {
    font: Option<Font<'static>>,
    font_size: f32,
}

impl Annotator {
    /// Load the label font, falling back to geometry-only output when missing
    pub fn load(font_path: &str, font_size: f32) -> Self {
        let font = match fs::read(font_path) {
            Ok(data) => match Font::try_from_vec(data) {
                Some(font) => Some(font),
                None => {
                    warn!("Failed to parse font file '{}', labels disabled", font_path);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read font file '{}': {}, labels disabled", font_path, e);
                None
            }
        };

        Self { font, font_size }
    }

    /// Annotator that only draws geometry
    pub fn without_text() -> Self {
        Self {
            font: None,
            font_size: 20.0,
        }
    }

    pub fn has_text(&self) -> bool {
        self.font.is_some()
    }

    /// Draw a detection box with its caption just above the top edge
    pub fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
        let bbox = detection.bbox;
        // Edges pushed past the margin stay off-screen, like a clipped line
        let (w, h) = (image.width() as i64, image.height() as i64);
        let margin = BOX_THICKNESS as i64;
        let clip = |v: i32, max: i64| (v as i64).clamp(-margin, max + margin) as i32;
        let (x1, y1) = (clip(bbox.x1, w), clip(bbox.y1, h));
        let (x2, y2) = (clip(bbox.x2, w), clip(bbox.y2, h));

        if x2 > x1 && y2 > y1 {
            draw_thick_rect(
                image,
                x1,
                y1,
                (x2 - x1) as u32,
                (y2 - y1) as u32,
                BOX_THICKNESS,
                BOX_COLOR,
            );
        }

        let x = x1.max(0);
        let y = bbox
            .y1
            .saturating_sub(10)
            .saturating_sub(self.font_size as i32)
            .clamp(0, h as i32);
        self.draw_text(image, x, y, &detection.caption(), LABEL_COLOR);
    }

    /// Overlay the read-attempt counter in the top-left corner
    pub fn draw_frame_counter(&self, image: &mut RgbImage, frame_index: u64) {
        let y = (30 - self.font_size as i32).max(0);
        self.draw_text(image, 10, y, &format!("Frame: {}", frame_index), COUNTER_COLOR);
    }

    /// Mark a held frame as stale while the source is being reopened
    pub fn draw_reconnect_banner(&self, image: &mut RgbImage) {
        draw_thick_rect(
            image,
            0,
            0,
            image.width(),
            image.height(),
            BANNER_THICKNESS,
            RECONNECT_COLOR,
        );

        let y = (50 - self.font_size as i32).max(0);
        self.draw_text(image, 50, y, RECONNECT_TEXT, RECONNECT_COLOR);
    }

    fn draw_text(&self, image: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
        if let Some(font) = &self.font {
            draw_text_mut(image, color, x, y, Scale::uniform(self.font_size), font, text);
        } else {
            debug!("Skipping text overlay '{}' (no font)", text);
        }
    }
}

/// Hollow rectangle grown inwards to the given thickness
fn draw_thick_rect(
    image: &mut RgbImage,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    thickness: i32,
    color: Rgb<u8>,
) {
    for inset in 0..thickness {
        let w = width as i64 - 2 * inset as i64;
        let h = height as i64 - 2 * inset as i64;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(x + inset, y + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(image, rect, color);
    }
}
