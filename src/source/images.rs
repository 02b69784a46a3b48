use super::CaptureBackend;
use crate::error::{Result, StreamguardError};
use crate::frame::Frame;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Plays a directory of still images as a video, in file name order.
///
/// Reaching the last image ends the stream; reopening starts over.
#[derive(Default)]
pub struct ImageSequenceBackend {
    files: Vec<PathBuf>,
    cursor: usize,
    is_open: bool,
}

impl ImageSequenceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a source reference points at something this backend can play
    pub fn accepts(source_ref: &str) -> bool {
        Path::new(source_ref).is_dir()
    }

    fn list_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

impl CaptureBackend for ImageSequenceBackend {
    fn name(&self) -> &'static str {
        "images"
    }

    fn open(&mut self, source_ref: &str) -> Result<()> {
        let files = Self::list_images(Path::new(source_ref))
            .map_err(|e| StreamguardError::unopenable(source_ref, e.to_string()))?;

        if files.is_empty() {
            return Err(StreamguardError::unopenable(
                source_ref,
                "directory contains no images",
            ));
        }

        info!("Image sequence {} has {} frames", source_ref, files.len());
        self.files = files;
        self.cursor = 0;
        self.is_open = true;
        Ok(())
    }

    fn read(&mut self) -> std::result::Result<Frame, String> {
        if !self.is_open {
            return Err("image sequence is not open".to_string());
        }

        let path = self
            .files
            .get(self.cursor)
            .ok_or_else(|| "end of image sequence".to_string())?;
        self.cursor += 1;

        debug!("Decoding {}", path.display());
        let image = image::open(path)
            .map_err(|e| format!("failed to decode {}: {}", path.display(), e))?
            .to_rgb8();

        Ok(Frame::new(image))
    }

    fn release(&mut self) {
        self.is_open = false;
        self.files.clear();
        self.cursor = 0;
    }
}
