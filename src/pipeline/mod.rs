use crate::display::DisplaySink;
use crate::error::{Result, StreamguardError};
use crate::event_log::EventLog;
use crate::frame::{Frame, FrameContext};
use crate::processor::FrameProcessor;
use crate::recovery::{ReconnectManager, StreamState};
use crate::source::{ReadFailure, StreamSource};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};


/// How the main loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Quit key or interrupt after a fully processed frame
    QuitRequested,
    /// The source could not be (re)opened within the retry budget
    StreamFailed,
}

impl RunOutcome {
    /// Process exit status for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::QuitRequested => 0,
            RunOutcome::StreamFailed => 1,
        }
    }
}

/// Drives read → process → quit poll, handing read failures to the
/// reconnect manager. All work for a frame finishes before the next read.
pub struct MainLoop {
    source: StreamSource,
    reconnect: ReconnectManager,
    processor: FrameProcessor,
    display: Box<dyn DisplaySink>,
    log: Arc<EventLog>,
    context: FrameContext,
    cancel: CancellationToken,
    reconnect_hold: Duration,
    quit_poll: Duration,
    last_good: Option<Frame>,
}

impl MainLoop {
    pub fn new(
        source: StreamSource,
        reconnect: ReconnectManager,
        processor: FrameProcessor,
        display: Box<dyn DisplaySink>,
        log: Arc<EventLog>,
    ) -> Self {
        Self {
            source,
            reconnect,
            processor,
            display,
            log,
            context: FrameContext::new(),
            cancel: CancellationToken::new(),
            reconnect_hold: Duration::from_millis(500),
            quit_poll: Duration::from_millis(1),
            last_good: None,
        }
    }

    /// External quit signal checked alongside the quit key
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Reconnect banner hold time and per-frame key poll timeout
    pub fn with_timing(mut self, reconnect_hold: Duration, quit_poll: Duration) -> Self {
        self.reconnect_hold = reconnect_hold;
        self.quit_poll = quit_poll;
        self
    }

    pub fn context(&self) -> &FrameContext {
        &self.context
    }

    pub fn stream_state(&self) -> StreamState {
        self.reconnect.state()
    }

    pub fn source(&self) -> &StreamSource {
        &self.source
    }

    pub fn processor(&self) -> &FrameProcessor {
        &self.processor
    }

    /// Run until quit or terminal stream failure.
    ///
    /// Fatal errors (detector, event log I/O, display) come back as `Err`.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        info!(
            "Starting stream loop for {} ({} backend)",
            self.source.source_ref(),
            self.source.backend_name()
        );

        match self.reconnect.connect(&mut self.source, &self.log).await {
            Ok(()) => {}
            Err(StreamguardError::ReconnectExhausted { .. }) => {
                warn!("Video source never opened, not entering the frame loop");
                return Ok(RunOutcome::StreamFailed);
            }
            Err(e) => return Err(e),
        }

        loop {
            let frame_index = self.context.advance();

            match self.source.read_frame() {
                Ok(frame) => {
                    self.processor.process(
                        &self.context,
                        &frame,
                        &self.log,
                        self.display.as_mut(),
                    )?;
                    self.last_good = Some(frame);

                    if self.quit_requested() {
                        info!("Quit signal received. Exiting.");
                        self.log.record("Quit signal received. Exiting.")?;
                        self.source.release();
                        return Ok(RunOutcome::QuitRequested);
                    }
                }
                Err(failure) => {
                    if let ReadFailure::Injected { .. } = failure {
                        warn!("Simulating frame read failure at frame {}", frame_index);
                        self.log.record(format!(
                            "Simulated frame read failure at frame {}.",
                            frame_index
                        ))?;
                    }

                    warn!("Frame read failed ({}). Attempting to reconnect...", failure);
                    self.log.record("Frame read failed. Attempting reconnection...")?;
                    self.show_reconnecting()?;

                    match self.reconnect.reconnect(&mut self.source, &self.log).await {
                        Ok(()) => debug!("Resuming after frame {}", frame_index),
                        Err(StreamguardError::ReconnectExhausted { .. }) => {
                            warn!("Exiting due to repeated failure to reconnect");
                            self.log
                                .record("Exiting due to repeated failure to reconnect.")?;
                            return Ok(RunOutcome::StreamFailed);
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    /// Hold the last good frame with the reconnect banner, if there is one
    fn show_reconnecting(&mut self) -> Result<()> {
        let Some(frame) = &self.last_good else {
            debug!("No previous frame, skipping reconnect banner");
            return Ok(());
        };

        let mut image = frame.image.clone();
        self.processor.annotator().draw_reconnect_banner(&mut image);
        self.display.show(self.processor.window(), &image)?;
        // Keys pressed during the hold are not treated as quit
        self.display.hold(self.reconnect_hold);
        Ok(())
    }

    fn quit_requested(&mut self) -> bool {
        let key_quit = self
            .display
            .poll_key(self.quit_poll)
            .map(|key| key.is_quit())
            .unwrap_or(false);

        key_quit || self.cancel.is_cancelled()
    }
}
