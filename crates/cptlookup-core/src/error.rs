use thiserror::Error;

/// Core error types for request handling
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid lookup request: {message}")]
    InvalidRequest { message: String },
}

impl CoreError {
    /// Create a new InvalidRequest error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
