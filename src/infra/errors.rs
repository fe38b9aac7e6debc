// src/infra/errors.rs — Error types for Nexus Echo

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EchoError {
    // Content-generation errors (degrade to "no external contribution")
    #[error("Provider '{provider}' error: {message}")]
    Provider {
        provider: String,
        message: String,
        retriable: bool,
    },

    #[error("Rate limited by '{provider}', retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Content generation timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Content generation is not available")]
    GenerationUnavailable,

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    // Persistence
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EchoError {
    /// Errors that mark the external capability as unhealthy (as opposed to
    /// it simply being switched off).
    pub fn is_external_failure(&self) -> bool {
        !matches!(self, EchoError::GenerationUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_not_a_failure() {
        assert!(!EchoError::GenerationUnavailable.is_external_failure());
        assert!(EchoError::Timeout { secs: 1 }.is_external_failure());
    }

    #[test]
    fn test_display_messages() {
        let e = EchoError::RateLimited {
            provider: "google".into(),
            retry_after_ms: 5000,
        };
        assert_eq!(
            e.to_string(),
            "Rate limited by 'google', retry after 5000ms"
        );
    }
}
