use super::{CaptureBackend, ImageSequenceBackend, TestPatternBackend};
use crate::config::SourceConfig;
use crate::error::{Result, StreamguardError};
use crate::frame::Frame;
use tracing::debug;

const TEST_PATTERN_SCHEME: &str = "testsrc://";

/// Picks a concrete backend from the source reference at every open.
///
/// `testsrc://` refs play the test pattern, directories play as image
/// sequences, and anything else goes through GStreamer when it is compiled in.
pub struct AutoBackend {
    pattern_resolution: (u32, u32),
    pattern_frames: u64,
    active: Option<Box<dyn CaptureBackend>>,
}

impl AutoBackend {
    pub fn new(pattern_resolution: (u32, u32), pattern_frames: u64) -> Self {
        Self {
            pattern_resolution,
            pattern_frames,
            active: None,
        }
    }

    fn select(&self, source_ref: &str) -> Result<Box<dyn CaptureBackend>> {
        if source_ref.starts_with(TEST_PATTERN_SCHEME) {
            return Ok(Box::new(TestPatternBackend::new(
                self.pattern_resolution,
                self.pattern_frames,
            )));
        }

        if ImageSequenceBackend::accepts(source_ref) {
            return Ok(Box::new(ImageSequenceBackend::new()));
        }

        gstreamer_backend(source_ref)
    }
}

#[cfg(all(feature = "gstreamer", target_os = "linux"))]
fn gstreamer_backend(_source_ref: &str) -> Result<Box<dyn CaptureBackend>> {
    Ok(Box::new(super::GstreamerBackend::new()?))
}

#[cfg(not(all(feature = "gstreamer", target_os = "linux")))]
fn gstreamer_backend(source_ref: &str) -> Result<Box<dyn CaptureBackend>> {
    Err(StreamguardError::unopenable(
        source_ref,
        "video decoding requires the gstreamer feature",
    ))
}

impl CaptureBackend for AutoBackend {
    fn name(&self) -> &'static str {
        self.active.as_ref().map(|b| b.name()).unwrap_or("auto")
    }

    fn open(&mut self, source_ref: &str) -> Result<()> {
        self.release();

        let mut backend = self.select(source_ref)?;
        debug!("Auto-selected {} backend for {}", backend.name(), source_ref);
        backend.open(source_ref)?;
        self.active = Some(backend);
        Ok(())
    }

    fn read(&mut self) -> std::result::Result<Frame, String> {
        match self.active.as_mut() {
            Some(backend) => backend.read(),
            None => Err("no backend is open".to_string()),
        }
    }

    fn release(&mut self) {
        if let Some(mut backend) = self.active.take() {
            backend.release();
        }
    }
}

/// Build the capture backend named in the configuration
pub fn backend_from_config(config: &SourceConfig) -> Result<Box<dyn CaptureBackend>> {
    match config.backend.as_str() {
        "auto" => Ok(Box::new(AutoBackend::new(config.resolution, config.frames))),
        "images" => Ok(Box::new(ImageSequenceBackend::new())),
        "test-pattern" => Ok(Box::new(TestPatternBackend::new(
            config.resolution,
            config.frames,
        ))),
        "gstreamer" => gstreamer_backend(&config.uri),
        other => Err(StreamguardError::system(format!(
            "Unknown source backend '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamguardConfig;

    #[test]
    fn test_auto_selects_test_pattern() {
        let mut backend = AutoBackend::new((20, 10), 0);
        backend.open("testsrc://lobby").unwrap();

        assert_eq!(backend.name(), "test-pattern");
        let frame = backend.read().unwrap();
        assert_eq!((frame.width(), frame.height()), (20, 10));

        backend.release();
        assert_eq!(backend.name(), "auto");
        assert!(backend.read().is_err());
    }

    #[cfg(not(all(feature = "gstreamer", target_os = "linux")))]
    #[test]
    fn test_auto_without_decoder_is_unopenable() {
        let mut backend = AutoBackend::new((20, 10), 0);
        let err = backend.open("missing_video.mp4").unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_backend_from_config() {
        let mut config = StreamguardConfig::default().source;
        config.backend = "test-pattern".to_string();
        assert_eq!(backend_from_config(&config).unwrap().name(), "test-pattern");

        config.backend = "images".to_string();
        assert_eq!(backend_from_config(&config).unwrap().name(), "images");

        config.backend = "auto".to_string();
        assert_eq!(backend_from_config(&config).unwrap().name(), "auto");

        config.backend = "v4l2".to_string();
        assert!(backend_from_config(&config).is_err());
    }
}
