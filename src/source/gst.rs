use super::CaptureBackend;
use crate::error::{Result, StreamguardError};
use crate::frame::Frame;
use gstreamer::prelude::*;
use gstreamer::{ClockTime, Pipeline};
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use image::RgbImage;
use tracing::{debug, info, warn};

const PREROLL_TIMEOUT_SECS: u64 = 10;
const SAMPLE_TIMEOUT_SECS: u64 = 5;

/// Decodes files and network streams (rtsp, http, ...) through GStreamer
pub struct GstreamerBackend {
    pipeline: Option<Pipeline>,
    appsink: Option<AppSink>,
}

impl GstreamerBackend {
    pub fn new() -> Result<Self> {
        gstreamer::init().map_err(|e| {
            StreamguardError::system(format!("Failed to initialize GStreamer: {}", e))
        })?;

        Ok(Self {
            pipeline: None,
            appsink: None,
        })
    }

    /// Build the decode pipeline description for a path or URI
    pub fn pipeline_description(source_ref: &str) -> String {
        let decoder = if source_ref.contains("://") {
            format!("uridecodebin uri=\"{}\"", source_ref)
        } else {
            format!("filesrc location=\"{}\" ! decodebin", source_ref)
        };

        format!(
            "{} ! videoconvert ! video/x-raw,format=RGB ! \
             appsink name=sink sync=false max-buffers=4 drop=false emit-signals=false",
            decoder
        )
    }

    fn sample_to_frame(sample: &gstreamer::Sample) -> std::result::Result<Frame, String> {
        let buffer = sample.buffer().ok_or("no buffer in sample")?;
        let caps = sample.caps().ok_or("no caps in sample")?;
        let info = VideoInfo::from_caps(caps).map_err(|e| format!("bad video caps: {}", e))?;

        let width = info.width();
        let height = info.height();
        let stride = info.stride()[0] as usize;
        let row_bytes = width as usize * 3;

        let map = buffer
            .map_readable()
            .map_err(|e| format!("failed to map buffer: {}", e))?;
        let data = map.as_slice();

        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            let end = start + row_bytes;
            if end > data.len() {
                return Err(format!("short buffer at row {}", row));
            }
            pixels.extend_from_slice(&data[start..end]);
        }

        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| "frame buffer size mismatch".to_string())?;
        Ok(Frame::new(image))
    }
}

impl CaptureBackend for GstreamerBackend {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn open(&mut self, source_ref: &str) -> Result<()> {
        let description = Self::pipeline_description(source_ref);
        debug!("Creating GStreamer pipeline: {}", description);

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| StreamguardError::unopenable(source_ref, e.to_string()))?
            .downcast::<Pipeline>()
            .map_err(|_| StreamguardError::unopenable(source_ref, "not a pipeline"))?;

        let appsink = pipeline
            .by_name("sink")
            .and_then(|element| element.downcast::<AppSink>().ok())
            .ok_or_else(|| StreamguardError::unopenable(source_ref, "appsink missing"))?;

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(StreamguardError::unopenable(source_ref, e.to_string()));
        }

        let (result, _, _) = pipeline.state(ClockTime::from_seconds(PREROLL_TIMEOUT_SECS));
        if let Err(e) = result {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(StreamguardError::unopenable(source_ref, e.to_string()));
        }

        info!("GStreamer pipeline playing for {}", source_ref);
        self.pipeline = Some(pipeline);
        self.appsink = Some(appsink);
        Ok(())
    }

    fn read(&mut self) -> std::result::Result<Frame, String> {
        let appsink = self.appsink.as_ref().ok_or("pipeline is not open")?;

        match appsink.try_pull_sample(ClockTime::from_seconds(SAMPLE_TIMEOUT_SECS)) {
            Some(sample) => Self::sample_to_frame(&sample),
            None if appsink.is_eos() => Err("end of stream".to_string()),
            None => Err("timed out waiting for a frame".to_string()),
        }
    }

    fn release(&mut self) {
        self.appsink = None;
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                warn!("Failed to stop GStreamer pipeline: {}", e);
            }
        }
    }
}

impl Drop for GstreamerBackend {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_description_for_uri_and_file() {
        let uri = GstreamerBackend::pipeline_description("rtsp://10.0.0.5/stream");
        assert!(uri.starts_with("uridecodebin uri=\"rtsp://10.0.0.5/stream\""));

        let file = GstreamerBackend::pipeline_description("video2.mp4");
        assert!(file.starts_with("filesrc location=\"video2.mp4\" ! decodebin"));
        assert!(file.contains("appsink name=sink"));
    }
}
