//! Error types for the match store collaborator.

use thiserror::Error;

/// Errors surfaced by a [`MatchStore`](crate::MatchStore) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Request never produced a response (connect failure, timeout, reset)
    #[error("Transport error: {0}")]
    Transport(String),
    
    /// Store answered with a non-success HTTP status
    #[error("Store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    
    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
    
    /// Store is temporarily unavailable (injected in simulation)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Creates a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
    
    /// Creates an unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
    
    /// Returns true if repeating the same request may succeed.
    ///
    /// Client errors (4xx) and undecodable bodies will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Transport(_) | StoreError::Unavailable(_) => true,
            StoreError::Status { status, .. } => *status >= 500 || *status == 429,
            StoreError::Decode(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::transport("reset").is_retryable());
        assert!(StoreError::unavailable("down").is_retryable());
        assert!(StoreError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(StoreError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(!StoreError::Status { status: 404, body: String::new() }.is_retryable());
        assert!(!StoreError::Decode("bad json".into()).is_retryable());
    }
}
