use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StreamguardConfig {
    pub source: SourceConfig,
    pub reconnect: ReconnectConfig,
    pub detector: DetectorConfig,
    pub display: DisplayConfig,
    pub event_log: EventLogConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceConfig {
    /// Video source reference (file path, image directory, stream URI or testsrc://)
    #[serde(default = "default_source_uri")]
    pub uri: String,

    /// Capture backend: auto, images, test-pattern or gstreamer
    #[serde(default = "default_source_backend")]
    pub backend: String,

    /// Inject a simulated read failure at this frame number
    pub simulate_failure_at: Option<u64>,

    /// Test pattern resolution (width, height)
    #[serde(default = "default_test_pattern_resolution")]
    pub resolution: (u32, u32),

    /// Number of test pattern frames per session (0 = unbounded)
    #[serde(default = "default_test_pattern_frames")]
    pub frames: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReconnectConfig {
    /// Consecutive open attempts per reconnection episode
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between open attempts
    #[serde(default = "default_backoff_seconds")]
    pub backoff_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectorConfig {
    /// Detector implementation
    #[serde(default = "default_detector_kind")]
    pub kind: String,

    /// Detections below this confidence are dropped before rendering and logging
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    /// ONNX model file, required when `kind = "onnx"`
    pub model_path: Option<String>,

    /// Class names one per line; COCO names when unset
    pub labels_path: Option<String>,

    /// Square model input side in pixels
    #[serde(default = "default_input_size")]
    pub input_size: u32,

    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,

    /// Overlap above which same-class boxes are suppressed
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    #[serde(default = "default_max_detections")]
    pub max_detections: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            kind: default_detector_kind(),
            min_confidence: default_min_confidence(),
            model_path: None,
            labels_path: None,
            input_size: default_input_size(),
            score_threshold: default_score_threshold(),
            iou_threshold: default_iou_threshold(),
            max_detections: default_max_detections(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DisplayConfig {
    /// Window identifier passed to the display sink
    #[serde(default = "default_window_title")]
    pub window_title: String,

    /// Skip the terminal display and keyboard polling entirely
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// How long the reconnect banner stays on screen
    #[serde(default = "default_reconnect_hold_ms")]
    pub reconnect_hold_ms: u64,

    /// Quit key poll timeout after each frame
    #[serde(default = "default_quit_poll_ms")]
    pub quit_poll_ms: u64,

    /// Write every shown frame to this JPEG path
    pub preview_path: Option<String>,

    /// TrueType font used for labels and counters
    #[serde(default = "default_font_path")]
    pub font_path: String,

    /// Label font size
    #[serde(default = "default_font_size")]
    pub font_size: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EventLogConfig {
    /// Append-only event log path
    #[serde(default = "default_event_log_path")]
    pub path: String,

    /// IANA timezone for record timestamps, local time when unset
    pub timezone: Option<String>,
}

impl ReconnectConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_seconds)
    }
}

impl DisplayConfig {
    pub fn reconnect_hold(&self) -> Duration {
        Duration::from_millis(self.reconnect_hold_ms)
    }

    pub fn quit_poll(&self) -> Duration {
        Duration::from_millis(self.quit_poll_ms)
    }
}

impl StreamguardConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("streamguard.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("source.uri", default_source_uri())?
            .set_default("source.backend", default_source_backend())?
            .set_default(
                "source.resolution",
                vec![
                    default_test_pattern_resolution().0,
                    default_test_pattern_resolution().1,
                ],
            )?
            .set_default("source.frames", default_test_pattern_frames())?
            .set_default("reconnect.max_attempts", default_max_attempts())?
            .set_default("reconnect.backoff_seconds", default_backoff_seconds())?
            .set_default("detector.kind", default_detector_kind())?
            .set_default("detector.min_confidence", default_min_confidence() as f64)?
            .set_default("detector.input_size", default_input_size())?
            .set_default("detector.score_threshold", default_score_threshold() as f64)?
            .set_default("detector.iou_threshold", default_iou_threshold() as f64)?
            .set_default("detector.max_detections", default_max_detections())?
            .set_default("display.window_title", default_window_title())?
            .set_default("display.headless", default_headless())?
            .set_default("display.reconnect_hold_ms", default_reconnect_hold_ms())?
            .set_default("display.quit_poll_ms", default_quit_poll_ms())?
            .set_default("display.font_path", default_font_path())?
            .set_default("display.font_size", default_font_size() as f64)?
            .set_default("event_log.path", default_event_log_path())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Environment variables with STREAMGUARD_ prefix, e.g. STREAMGUARD_SOURCE__URI
            .add_source(
                Environment::with_prefix("STREAMGUARD")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: StreamguardConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.uri.trim().is_empty() {
            return Err(ConfigError::Message(
                "Source uri must not be empty".to_string(),
            ));
        }

        if !matches!(
            self.source.backend.as_str(),
            "auto" | "images" | "test-pattern" | "gstreamer"
        ) {
            return Err(ConfigError::Message(format!(
                "Unknown source backend '{}'",
                self.source.backend
            )));
        }

        if self.source.resolution.0 == 0 || self.source.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Source resolution must be greater than 0".to_string(),
            ));
        }

        if self.source.simulate_failure_at == Some(0) {
            return Err(ConfigError::Message(
                "simulate_failure_at counts frames from 1".to_string(),
            ));
        }

        if self.reconnect.max_attempts == 0 {
            return Err(ConfigError::Message(
                "Reconnect max_attempts must be greater than 0".to_string(),
            ));
        }

        if !matches!(self.detector.kind.as_str(), "none" | "onnx") {
            return Err(ConfigError::Message(format!(
                "Unknown detector kind '{}'",
                self.detector.kind
            )));
        }

        if self.detector.kind == "onnx" && self.detector.model_path.is_none() {
            return Err(ConfigError::Message(
                "Detector kind 'onnx' needs a model_path".to_string(),
            ));
        }

        for (name, value) in [
            ("min_confidence", self.detector.min_confidence),
            ("score_threshold", self.detector.score_threshold),
            ("iou_threshold", self.detector.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Message(format!(
                    "Detector {} must be within [0, 1]",
                    name
                )));
            }
        }

        if self.detector.input_size == 0 || self.detector.max_detections == 0 {
            return Err(ConfigError::Message(
                "Detector input_size and max_detections must be greater than 0".to_string(),
            ));
        }

        if self.display.font_size <= 0.0 {
            return Err(ConfigError::Message(
                "Display font_size must be greater than 0".to_string(),
            ));
        }

        if self.event_log.path.trim().is_empty() {
            return Err(ConfigError::Message(
                "Event log path must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for StreamguardConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig {
                uri: default_source_uri(),
                backend: default_source_backend(),
                simulate_failure_at: None,
                resolution: default_test_pattern_resolution(),
                frames: default_test_pattern_frames(),
            },
            reconnect: ReconnectConfig {
                max_attempts: default_max_attempts(),
                backoff_seconds: default_backoff_seconds(),
            },
            detector: DetectorConfig::default(),
            display: DisplayConfig {
                window_title: default_window_title(),
                headless: default_headless(),
                reconnect_hold_ms: default_reconnect_hold_ms(),
                quit_poll_ms: default_quit_poll_ms(),
                preview_path: None,
                font_path: default_font_path(),
                font_size: default_font_size(),
            },
            event_log: EventLogConfig {
                path: default_event_log_path(),
                timezone: None,
            },
        }
    }
}

// Default value functions
fn default_source_uri() -> String {
    "video2.mp4".to_string()
}
fn default_source_backend() -> String {
    "auto".to_string()
}
fn default_test_pattern_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_test_pattern_frames() -> u64 {
    0
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_seconds() -> u64 {
    2
}

fn default_detector_kind() -> String {
    "none".to_string()
}
fn default_min_confidence() -> f32 {
    0.0
}
fn default_input_size() -> u32 {
    640
}
fn default_score_threshold() -> f32 {
    0.25
}
fn default_iou_threshold() -> f32 {
    0.45
}
fn default_max_detections() -> u32 {
    100
}

fn default_window_title() -> String {
    "Smart Video Player - Object Detection".to_string()
}
fn default_headless() -> bool {
    false
}
fn default_reconnect_hold_ms() -> u64 {
    500
}
fn default_quit_poll_ms() -> u64 {
    1
}
fn default_font_path() -> String {
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string()
}
fn default_font_size() -> f32 {
    20.0
}

fn default_event_log_path() -> String {
    "logs/detections.log".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = StreamguardConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.reconnect.max_attempts, 3);
        assert_eq!(config.reconnect.backoff(), Duration::from_secs(2));
        assert_eq!(config.display.reconnect_hold(), Duration::from_millis(500));
        assert_eq!(config.event_log.path, "logs/detections.log");
    }

    #[test]
    fn test_config_validation() {
        let mut config = StreamguardConfig::default();

        config.reconnect.max_attempts = 0;
        assert!(config.validate().is_err());
        config.reconnect.max_attempts = 3;

        config.detector.min_confidence = 1.5;
        assert!(config.validate().is_err());
        config.detector.min_confidence = 0.25;

        config.source.backend = "v4l2".to_string();
        assert!(config.validate().is_err());
        config.source.backend = "test-pattern".to_string();

        config.source.simulate_failure_at = Some(0);
        assert!(config.validate().is_err());
        config.source.simulate_failure_at = Some(100);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_onnx_detector_validation() {
        let mut config = StreamguardConfig::default();

        config.detector.kind = "onnx".to_string();
        assert!(config.validate().is_err());
        config.detector.model_path = Some("models/yolov8n.onnx".to_string());
        assert!(config.validate().is_ok());

        config.detector.iou_threshold = 1.2;
        assert!(config.validate().is_err());
        config.detector.iou_threshold = 0.45;

        config.detector.input_size = 0;
        assert!(config.validate().is_err());
        config.detector.input_size = 320;

        config.detector.kind = "tensorrt".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_detector_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streamguard.toml");
        std::fs::write(
            &path,
            "[detector]\nkind = \"onnx\"\nmodel_path = \"yolov8n.onnx\"\nscore_threshold = 0.4\n",
        )
        .unwrap();

        let config = StreamguardConfig::load_from_file(&path).unwrap();

        assert_eq!(config.detector.kind, "onnx");
        assert_eq!(config.detector.model_path.as_deref(), Some("yolov8n.onnx"));
        assert_eq!(config.detector.score_threshold, 0.4);
        assert_eq!(config.detector.input_size, 640);
        assert_eq!(config.detector.max_detections, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streamguard.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[source]\nuri = \"testsrc://demo\"\nsimulate_failure_at = 100\n\n[reconnect]\nbackoff_seconds = 5\n"
        )
        .unwrap();

        let config = StreamguardConfig::load_from_file(&path).unwrap();

        assert_eq!(config.source.uri, "testsrc://demo");
        assert_eq!(config.source.simulate_failure_at, Some(100));
        assert_eq!(config.reconnect.backoff_seconds, 5);
        assert_eq!(config.reconnect.max_attempts, 3);
        assert_eq!(config.display.window_title, default_window_title());
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = StreamguardConfig::default();
        let rendered = toml::to_string(&config).unwrap();

        assert!(rendered.contains("[reconnect]"));
        assert!(rendered.contains("max_attempts = 3"));
    }
}
