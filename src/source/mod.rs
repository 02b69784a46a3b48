mod auto;
mod fault;
#[cfg(all(feature = "gstreamer", target_os = "linux"))]
mod gst;
mod images;
mod pattern;
#[cfg(test)]
pub(crate) mod scripted;
mod stream;

pub use auto::{backend_from_config, AutoBackend};
pub use fault::{FailAtReads, FaultPoint, NoFaults};
#[cfg(all(feature = "gstreamer", target_os = "linux"))]
pub use gst::GstreamerBackend;
pub use images::ImageSequenceBackend;
pub use pattern::TestPatternBackend;
pub use stream::{ReadFailure, StreamHandle, StreamSource};

use crate::error::Result;
use crate::frame::Frame;

/// Raw video capture capability.
///
/// A backend holds at most one open capture session. `open` may block on
/// device or network setup; `read` blocks until a frame arrives or the
/// capture reports that none is available.
pub trait CaptureBackend: Send {
    /// Backend identifier
    fn name(&self) -> &'static str;

    /// Open a capture session for a file path, directory or stream URI
    fn open(&mut self, source_ref: &str) -> Result<()>;

    /// Read the next frame, `Err` when the capture has no frame to give
    fn read(&mut self) -> std::result::Result<Frame, String>;

    /// Close the session. Calling this on a closed backend is a no-op.
    fn release(&mut self);
}
