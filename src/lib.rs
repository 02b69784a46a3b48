pub mod annotate;
pub mod config;
pub mod detection;
pub mod display;
pub mod error;
pub mod event_log;
pub mod frame;
pub mod pipeline;
pub mod processor;
pub mod recovery;
pub mod source;

pub use annotate::Annotator;
pub use config::StreamguardConfig;
pub use detection::{
    detector_from_config, BoundingBox, ConfidenceFilter, Detection, Detector, NullDetector,
    ScriptedDetector,
};
pub use display::{DisplaySink, HeadlessDisplay, Key, PreviewWriter, TerminalDisplay, TerminalLogWriter};
pub use error::{Result, StreamguardError};
pub use event_log::{EventLog, LogRecord};
pub use frame::{Frame, FrameContext};
pub use pipeline::{MainLoop, RunOutcome};
pub use processor::{AnnotatedFrame, FrameProcessor};
pub use recovery::{ReconnectManager, ReconnectPolicy, Sleeper, StreamState, TokioSleeper};
pub use source::{
    backend_from_config, CaptureBackend, FailAtReads, FaultPoint, NoFaults, ReadFailure,
    StreamHandle, StreamSource,
};
