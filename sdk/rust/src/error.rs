//! Error type for backend operations

use thiserror::Error;

/// Error returned by every [`Backend`](crate::Backend) operation
#[derive(Error, Debug)]
pub enum BackendError {
    /// The addressed session or trajectory does not exist (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Non-success response other than 404
    #[error("Backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Connection, timeout, or body read failure
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response body did not match the expected shape
    #[error("Invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Stream ended abnormally
    #[error("Stream error: {0}")]
    Stream(String),

    /// Client misconfiguration (bad base URL, ...)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BackendError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// The "session not found" signal that triggers a transparent recovery
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Status { status, .. } => *status == 404,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        assert!(BackendError::not_found("Session not found").is_not_found());
        assert!(BackendError::status(404, "gone").is_not_found());
        assert!(!BackendError::status(500, "boom").is_not_found());
        assert!(!BackendError::Stream("reset".to_string()).is_not_found());
    }

    #[test]
    fn test_display() {
        let err = BackendError::status(400, "Missing API key");
        assert_eq!(err.to_string(), "Backend returned HTTP 400: Missing API key");
    }
}
