//! Cloud provider errors

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when talking to a cloud provider.
#[derive(Debug, Error)]
pub enum CloudError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider API returned an error
    #[error("provider API error: {0}")]
    Api(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Authentication failed (bad credential, expired token)
    #[error("authentication failed: {0}")]
    Auth(String),

    /// An asynchronous operation did not reach a terminal state in time
    #[error("operation `{operation}` did not complete within {waited:?}")]
    Timeout {
        /// Provider-assigned operation name
        operation: String,
        /// Total time spent polling
        waited: Duration,
    },

    /// Request rejected before reaching the provider
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether the error is worth retrying on the next poll. Transport
    /// failures and generic API errors are; auth failures and malformed
    /// requests are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Api(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(CloudError::Api("502".to_string()).is_transient());
        assert!(!CloudError::Auth("bad token".to_string()).is_transient());
        assert!(!CloudError::NotFound("op".to_string()).is_transient());
    }
}
