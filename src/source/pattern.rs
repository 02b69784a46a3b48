use super::CaptureBackend;
use crate::error::Result;
use crate::frame::Frame;
use image::{Rgb, RgbImage};
use tracing::debug;

/// Synthetic moving gradient, used for demos and dry runs.
///
/// `frames_per_session` bounds how many frames each open session yields
/// before reads start failing (0 means unbounded).
pub struct TestPatternBackend {
    width: u32,
    height: u32,
    frames_per_session: u64,
    produced: u64,
    is_open: bool,
}

impl TestPatternBackend {
    pub fn new(resolution: (u32, u32), frames_per_session: u64) -> Self {
        Self {
            width: resolution.0,
            height: resolution.1,
            frames_per_session,
            produced: 0,
            is_open: false,
        }
    }

    fn render(&self, tick: u64) -> RgbImage {
        let shift = (tick % 256) as u32;
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let r = ((x * 255 / self.width.max(1)) + shift) % 256;
            let g = ((y * 255 / self.height.max(1)) + shift / 2) % 256;
            Rgb([r as u8, g as u8, 96])
        })
    }
}

impl CaptureBackend for TestPatternBackend {
    fn name(&self) -> &'static str {
        "test-pattern"
    }

    fn open(&mut self, source_ref: &str) -> Result<()> {
        debug!(
            "Test pattern {} opened at {}x{}",
            source_ref, self.width, self.height
        );
        self.produced = 0;
        self.is_open = true;
        Ok(())
    }

    fn read(&mut self) -> std::result::Result<Frame, String> {
        if !self.is_open {
            return Err("test pattern is not open".to_string());
        }
        if self.frames_per_session > 0 && self.produced >= self.frames_per_session {
            return Err("end of test pattern".to_string());
        }

        self.produced += 1;
        Ok(Frame::new(self.render(self.produced)))
    }

    fn release(&mut self) {
        self.is_open = false;
    }
}
