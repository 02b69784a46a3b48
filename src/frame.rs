use chrono::{DateTime, Local};
use image::RgbImage;
use std::time::SystemTime;

/// A decoded video frame in packed RGB
#[derive(Debug, Clone)]
pub struct Frame {
    /// Pixel data
    pub image: RgbImage,
    /// Timestamp when the frame was read from the source
    pub captured_at: SystemTime,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: SystemTime::now(),
        }
    }

    /// Frame filled with a single colour
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::new(RgbImage::from_pixel(width, height, image::Rgb(rgb)))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Read-attempt counter shared by the main loop and the frame processor.
///
/// The index advances once per read attempt, successful or not, so frame
/// numbers track wall-clock reads rather than delivered frames.
#[derive(Debug, Clone)]
pub struct FrameContext {
    frame_index: u64,
    timestamp: DateTime<Local>,
}

impl FrameContext {
    pub fn new() -> Self {
        Self {
            frame_index: 0,
            timestamp: Local::now(),
        }
    }

    /// Register a read attempt and return its frame number (starting at 1)
    pub fn advance(&mut self) -> u64 {
        self.frame_index += 1;
        self.timestamp = Local::now();
        self.frame_index
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Time of the latest read attempt
    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }
}

impl Default for FrameContext {
    fn default() -> Self {
        Self::new()
    }
}
