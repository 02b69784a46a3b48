//! Capture backend driven by a fixed script of open and read outcomes.

use super::CaptureBackend;
use crate::error::{Result, StreamguardError};
use crate::frame::Frame;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ScriptedRead {
    Frame,
    Fail,
}

#[derive(Debug, Default)]
struct UsageState {
    open_attempts: u32,
    releases: u32,
    reads: u64,
    open_sessions: u32,
    max_open_sessions: u32,
}

/// Shared view of what the backend was asked to do
#[derive(Debug, Clone, Default)]
pub(crate) struct BackendUsage {
    state: Arc<Mutex<UsageState>>,
}

impl BackendUsage {
    pub(crate) fn open_attempts(&self) -> u32 {
        self.state.lock().open_attempts
    }

    pub(crate) fn releases(&self) -> u32 {
        self.state.lock().releases
    }

    pub(crate) fn reads(&self) -> u64 {
        self.state.lock().reads
    }

    pub(crate) fn max_open_sessions(&self) -> u32 {
        self.state.lock().max_open_sessions
    }
}

/// Encode a read number into the pixel colour so tests can tell frames apart
pub(crate) fn frame_marker(read: u64) -> [u8; 3] {
    [(read & 0xff) as u8, ((read >> 8) & 0xff) as u8, 7]
}

pub(crate) fn marker_of(frame_pixel: [u8; 3]) -> u64 {
    frame_pixel[0] as u64 | (frame_pixel[1] as u64) << 8
}

pub(crate) struct ScriptedBackend {
    opens: VecDeque<bool>,
    reads: VecDeque<ScriptedRead>,
    is_open: bool,
    usage: BackendUsage,
}

impl ScriptedBackend {
    /// Opens beyond the script fail, reads beyond the script fail
    pub(crate) fn new(opens: Vec<bool>, reads: Vec<ScriptedRead>) -> Self {
        Self {
            opens: opens.into(),
            reads: reads.into(),
            is_open: false,
            usage: BackendUsage::default(),
        }
    }

    /// A source that opens as often as asked and yields `count` good frames
    pub(crate) fn frames(count: usize) -> Self {
        Self::new(vec![true; 16], vec![ScriptedRead::Frame; count])
    }

    pub(crate) fn usage(&self) -> BackendUsage {
        self.usage.clone()
    }
}

impl CaptureBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn open(&mut self, source_ref: &str) -> Result<()> {
        let mut state = self.usage.state.lock();
        state.open_attempts += 1;

        if self.opens.pop_front().unwrap_or(false) {
            self.is_open = true;
            state.open_sessions += 1;
            state.max_open_sessions = state.max_open_sessions.max(state.open_sessions);
            Ok(())
        } else {
            Err(StreamguardError::unopenable(source_ref, "scripted open failure"))
        }
    }

    fn read(&mut self) -> std::result::Result<Frame, String> {
        let mut state = self.usage.state.lock();
        state.reads += 1;
        let read = state.reads;

        match self.reads.pop_front() {
            Some(ScriptedRead::Frame) if self.is_open => Ok(Frame::solid(16, 12, frame_marker(read))),
            Some(_) => Err("scripted read failure".to_string()),
            None => Err("end of script".to_string()),
        }
    }

    fn release(&mut self) {
        if self.is_open {
            self.is_open = false;
            let mut state = self.usage.state.lock();
            state.releases += 1;
            state.open_sessions -= 1;
        }
    }
}
