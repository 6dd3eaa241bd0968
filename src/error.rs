//! Error types for ember_vision

use thiserror::Error;

/// Errors surfaced by the fire pipeline.
///
/// Only `SourceUnavailable` and `Config` ever stop processing. Detector and
/// notification failures are recovered inside the pipeline and only appear
/// here when a collaborator is called directly.
#[derive(Error, Debug)]
pub enum FireError {
    #[error("Frame source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Detector error: {0}")]
    Detector(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stream worker is no longer running")]
    StreamClosed,
}

/// Failure reported by an object-detector collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("malformed detector output: {0}")]
    Malformed(String),
}

/// Failure reported by a notification collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("notifier unavailable: {0}")]
    Unavailable(String),
}

impl From<DetectorError> for FireError {
    fn from(err: DetectorError) -> Self {
        FireError::Detector(err.to_string())
    }
}

impl From<NotifyError> for FireError {
    fn from(err: NotifyError) -> Self {
        FireError::Notification(err.to_string())
    }
}

impl From<toml::de::Error> for FireError {
    fn from(err: toml::de::Error) -> Self {
        FireError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_error_display() {
        let err = FireError::SourceUnavailable("camera 0".to_string());
        assert!(err.to_string().contains("Frame source unavailable"));
        assert!(err.to_string().contains("camera 0"));
    }

    #[test]
    fn test_fire_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: FireError = io_err.into();
        match err {
            FireError::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_collaborator_errors_convert() {
        let err: FireError = DetectorError::Inference("timeout".to_string()).into();
        assert!(matches!(err, FireError::Detector(ref msg) if msg.contains("timeout")));

        let err: FireError = NotifyError::Delivery("smtp down".to_string()).into();
        assert!(matches!(err, FireError::Notification(ref msg) if msg.contains("smtp down")));
    }
}
