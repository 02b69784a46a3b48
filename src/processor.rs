use crate::annotate::Annotator;
use crate::detection::{Detection, Detector};
use crate::display::DisplaySink;
use crate::error::Result;
use crate::event_log::EventLog;
use crate::frame::{Frame, FrameContext};
use image::RgbImage;
use tracing::{debug, error, info};

/// Result of processing one frame
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    /// Read-attempt number the frame was read at
    pub frame_index: u64,
    /// Frame with boxes, captions and counter drawn on it
    pub image: RgbImage,
    /// Detections drawn, in detector order
    pub detections: Vec<Detection>,
}

/// Per-frame detect, annotate, log and display
pub struct FrameProcessor {
    detector: Box<dyn Detector>,
    annotator: Annotator,
    window: String,
    frames_processed: u64,
}

impl FrameProcessor {
    pub fn new<S: Into<String>>(detector: Box<dyn Detector>, annotator: Annotator, window: S) -> Self {
        let processor = Self {
            detector,
            annotator,
            window: window.into(),
            frames_processed: 0,
        };
        info!(
            "Frame processor ready (detector: {}, labels: {})",
            processor.detector.name(),
            processor.annotator.has_text()
        );
        processor
    }

    pub fn window(&self) -> &str {
        &self.window
    }

    pub fn annotator(&self) -> &Annotator {
        &self.annotator
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Run the detector on `frame` and deliver the annotated copy.
    ///
    /// The frame itself is left untouched; annotation happens on a copy so
    /// the caller can keep the raw frame around.
    pub fn process(
        &mut self,
        ctx: &FrameContext,
        frame: &Frame,
        log: &EventLog,
        display: &mut dyn DisplaySink,
    ) -> Result<AnnotatedFrame> {
        let frame_index = ctx.frame_index();

        let detections = match self.detector.detect(frame) {
            Ok(detections) => detections,
            Err(e) => {
                error!("Detector failed on frame {}: {}", frame_index, e);
                log.record(format!("Detector failure at frame {}: {}", frame_index, e))?;
                return Err(e);
            }
        };
        debug!("Frame {}: {} detections", frame_index, detections.len());

        let mut image = frame.image.clone();
        for detection in &detections {
            self.annotator.draw_detection(&mut image, detection);
            log.record(format!(
                "Detected: {} with confidence {:.2}",
                detection.label, detection.confidence
            ))?;
        }

        self.annotator.draw_frame_counter(&mut image, frame_index);
        log.record(format!("Processing frame {}", frame_index))?;

        display.show(&self.window, &image)?;
        self.frames_processed += 1;

        Ok(AnnotatedFrame {
            frame_index,
            image,
            detections,
        })
    }
}
