use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamguardError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Video source '{source_ref}' could not be opened: {details}")]
    SourceUnopenable { source_ref: String, details: String },

    #[error("Frame read failed: {details}")]
    ReadFailed { details: String },

    #[error("Video source failed after {attempts} reconnection attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Detector failure: {message}")]
    Detector { message: String },

    #[error("Annotation error: {message}")]
    Annotation { message: String },

    #[error("Display error: {message}")]
    Display { message: String },

    #[error("System error: {message}")]
    System { message: String },
}

impl StreamguardError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn detector<S: Into<String>>(message: S) -> Self {
        Self::Detector {
            message: message.into(),
        }
    }

    pub fn display<S: Into<String>>(message: S) -> Self {
        Self::Display {
            message: message.into(),
        }
    }

    pub fn unopenable<S: Into<String>, D: Into<String>>(source_ref: S, details: D) -> Self {
        Self::SourceUnopenable {
            source_ref: source_ref.into(),
            details: details.into(),
        }
    }

    /// Whether the stream layer can recover from this error by reopening the source
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StreamguardError::SourceUnopenable { .. } | StreamguardError::ReadFailed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StreamguardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(StreamguardError::unopenable("cam", "refused").is_recoverable());
        assert!(StreamguardError::ReadFailed {
            details: "eof".to_string()
        }
        .is_recoverable());
        assert!(!StreamguardError::detector("model crashed").is_recoverable());
        assert!(!StreamguardError::ReconnectExhausted { attempts: 3 }.is_recoverable());
    }

    #[test]
    fn test_error_messages() {
        let err = StreamguardError::unopenable("rtsp://cam/1", "connection refused");
        assert_eq!(
            err.to_string(),
            "Video source 'rtsp://cam/1' could not be opened: connection refused"
        );

        let err = StreamguardError::system("boom");
        assert_eq!(err.to_string(), "System error: boom");
    }
}
