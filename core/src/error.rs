//! Core error types and utilities

use thiserror::Error;

/// Core-specific error types
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Spawn error: {0}")]
    Spawn(String),

    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("Signal error: {0}")]
    Signal(String),

    #[error("Wait error: {0}")]
    Wait(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LaunchError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            LaunchError::Spawn(_) => "LNCH001",
            LaunchError::ChannelUnavailable(_) => "LNCH002",
            LaunchError::Signal(_) => "LNCH003",
            LaunchError::Wait(_) => "LNCH004",
            LaunchError::Validation(_) => "LNCH005",
            LaunchError::Io(_) => "LNCH006",
            LaunchError::Serialization(_) => "LNCH007",
        }
    }
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, LaunchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(LaunchError::Spawn("test".to_string()).code(), "LNCH001");
        assert_eq!(
            LaunchError::ChannelUnavailable("test".to_string()).code(),
            "LNCH002"
        );
        assert_eq!(LaunchError::Signal("test".to_string()).code(), "LNCH003");
        assert_eq!(LaunchError::Wait("test".to_string()).code(), "LNCH004");
    }

    #[test]
    fn test_error_display() {
        let error = LaunchError::Spawn("executable not found".to_string());
        assert_eq!(error.to_string(), "Spawn error: executable not found");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error: LaunchError = io_err.into();
        assert!(matches!(error, LaunchError::Io(_)));
        assert_eq!(error.code(), "LNCH006");
    }
}
