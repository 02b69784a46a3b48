use super::{CaptureBackend, FaultPoint, NoFaults};
use crate::error::{Result, StreamguardError};
use crate::frame::Frame;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Why a frame read produced no frame
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadFailure {
    #[error("stream is not open")]
    NotOpen,

    #[error("capture returned no frame: {0}")]
    NoFrame(String),

    #[error("simulated read failure at frame {attempt}")]
    Injected { attempt: u64 },
}

impl From<ReadFailure> for StreamguardError {
    fn from(failure: ReadFailure) -> Self {
        StreamguardError::ReadFailed {
            details: failure.to_string(),
        }
    }
}

/// One open capture session
#[derive(Debug, Clone)]
pub struct StreamHandle {
    source_ref: String,
    session: u64,
    opened_at: SystemTime,
}

impl StreamHandle {
    pub fn source_ref(&self) -> &str {
        &self.source_ref
    }

    /// Sequence number of this session, starting at 1
    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn opened_at(&self) -> SystemTime {
        self.opened_at
    }
}

/// Owner of the capture backend and its single open handle
pub struct StreamSource {
    backend: Box<dyn CaptureBackend>,
    source_ref: String,
    handle: Option<StreamHandle>,
    fault_point: Box<dyn FaultPoint>,
    sessions_opened: u64,
    read_attempts: u64,
}

impl StreamSource {
    pub fn new<S: Into<String>>(backend: Box<dyn CaptureBackend>, source_ref: S) -> Self {
        Self {
            backend,
            source_ref: source_ref.into(),
            handle: None,
            fault_point: Box::new(NoFaults),
            sessions_opened: 0,
            read_attempts: 0,
        }
    }

    /// Install a fault injection hook for testing and demos
    pub fn with_fault_point(mut self, fault_point: Box<dyn FaultPoint>) -> Self {
        self.fault_point = fault_point;
        self
    }

    pub fn source_ref(&self) -> &str {
        &self.source_ref
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<&StreamHandle> {
        self.handle.as_ref()
    }

    /// Total read attempts made through this source
    pub fn read_attempts(&self) -> u64 {
        self.read_attempts
    }

    /// Open the source. Any previous handle is released first.
    pub fn open(&mut self) -> Result<&StreamHandle> {
        if self.handle.is_some() {
            warn!("Opening {} while a handle is still open, releasing it first", self.source_ref);
            self.release();
        }

        debug!("Opening {} with {} backend", self.source_ref, self.backend.name());
        self.backend.open(&self.source_ref)?;

        self.sessions_opened += 1;
        info!("Opened {} (session {})", self.source_ref, self.sessions_opened);

        Ok(self.handle.insert(StreamHandle {
            source_ref: self.source_ref.clone(),
            session: self.sessions_opened,
            opened_at: SystemTime::now(),
        }))
    }

    /// Read one frame from the open handle
    pub fn read_frame(&mut self) -> std::result::Result<Frame, ReadFailure> {
        if self.handle.is_none() {
            return Err(ReadFailure::NotOpen);
        }

        self.read_attempts += 1;
        let attempt = self.read_attempts;

        let frame = self.backend.read().map_err(ReadFailure::NoFrame)?;

        // The real read happened; an injected fault discards its frame
        if self.fault_point.should_fail(attempt) {
            debug!("Injecting read failure at attempt {}", attempt);
            return Err(ReadFailure::Injected { attempt });
        }

        trace!("Read frame {}x{} (attempt {})", frame.width(), frame.height(), attempt);
        Ok(frame)
    }

    /// Release the open handle, if any
    pub fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.backend.release();
            debug!("Released {} (session {})", handle.source_ref, handle.session);
        }
    }
}

impl Drop for StreamSource {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::scripted::{ScriptedBackend, ScriptedRead};
    use crate::source::FailAtReads;

    #[test]
    fn test_read_before_open_fails() {
        let backend = ScriptedBackend::new(vec![true], vec![ScriptedRead::Frame]);
        let mut source = StreamSource::new(Box::new(backend), "cam");

        assert_eq!(source.read_frame().unwrap_err(), ReadFailure::NotOpen);
        assert_eq!(source.read_attempts(), 0);
    }

    #[test]
    fn test_open_read_release() {
        let backend = ScriptedBackend::new(vec![true], vec![ScriptedRead::Frame]);
        let usage = backend.usage();
        let mut source = StreamSource::new(Box::new(backend), "video.mp4");

        let handle = source.open().unwrap();
        assert_eq!(handle.session(), 1);
        assert_eq!(handle.source_ref(), "video.mp4");

        assert!(source.read_frame().is_ok());
        assert!(matches!(source.read_frame(), Err(ReadFailure::NoFrame(_))));
        assert_eq!(source.read_attempts(), 2);

        source.release();
        source.release();
        assert!(!source.is_open());
        assert_eq!(usage.releases(), 1);
    }

    #[test]
    fn test_reopen_releases_previous_handle() {
        let backend = ScriptedBackend::new(vec![true, true], vec![]);
        let usage = backend.usage();
        let mut source = StreamSource::new(Box::new(backend), "cam");

        source.open().unwrap();
        let session = source.open().unwrap().session();

        assert_eq!(session, 2);
        assert_eq!(usage.releases(), 1);
        assert_eq!(usage.max_open_sessions(), 1);
    }

    #[test]
    fn test_failed_open_leaves_source_closed() {
        let backend = ScriptedBackend::new(vec![false], vec![]);
        let mut source = StreamSource::new(Box::new(backend), "rtsp://nowhere");

        let err = source.open().unwrap_err();
        assert!(matches!(err, StreamguardError::SourceUnopenable { .. }));
        assert!(!source.is_open());
    }

    #[test]
    fn test_injected_fault_consumes_the_read() {
        let backend = ScriptedBackend::new(
            vec![true],
            vec![ScriptedRead::Frame, ScriptedRead::Frame, ScriptedRead::Frame],
        );
        let usage = backend.usage();
        let mut source = StreamSource::new(Box::new(backend), "cam")
            .with_fault_point(Box::new(FailAtReads::new([2])));

        source.open().unwrap();
        assert!(source.read_frame().is_ok());
        assert_eq!(
            source.read_frame().unwrap_err(),
            ReadFailure::Injected { attempt: 2 }
        );
        assert!(source.read_frame().is_ok());
        assert_eq!(usage.reads(), 3);
    }
}
