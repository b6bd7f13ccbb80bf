//! Error types for lisn.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LisnError {
    // Input validation errors, rejected before any request goes out
    #[error("Invalid query: {message}")]
    Validation { message: String },

    // Credential errors, surfaced by prompting for a token instead of a
    // generic failure
    #[error("Authentication required")]
    AuthRequired,

    // Transport-level request failures
    #[error("Network error: {message}")]
    Network { message: String },

    // Non-2xx responses with a structured detail message
    #[error("Server error ({status}): {detail}")]
    Server { status: u16, detail: String },

    // Push-stream payloads that failed to parse. Dropped by the listener,
    // never fatal
    #[error("Malformed progress event: {message}")]
    MalformedEvent { message: String },

    // Media failures, reported without corrupting the play/pause state
    #[error("Playback error: {message}")]
    Playback { message: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl LisnError {
    /// Classify a reqwest failure.
    ///
    /// Everything that failed before a response arrived is a network error;
    /// status-code classification happens at the call site where the
    /// response body is available.
    pub fn from_request(err: reqwest::Error) -> Self {
        LisnError::Network {
            message: err.to_string(),
        }
    }

    /// Classify a non-2xx response status with its parsed detail message.
    ///
    /// 401 is a distinct error kind: the caller prompts for credentials
    /// instead of showing a generic message.
    pub fn from_status(status: u16, detail: String) -> Self {
        if status == 401 {
            LisnError::AuthRequired
        } else {
            LisnError::Server { status, detail }
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, LisnError>;
