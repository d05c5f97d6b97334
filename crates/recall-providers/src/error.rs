//! Error types shared by all provider implementations.

use thiserror::Error;

/// Errors that can occur when talking to an embedding, completion or
/// relevance backend.
///
/// Every variant is a recoverable result for the pipeline: callers convert
/// these into degraded behavior (fewer candidates, fusion-only ranking,
/// empty context) rather than propagating them to the end user.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider '{0}' is disabled")]
    Disabled(String),

    #[error("no provider registered under '{0}'")]
    Missing(String),

    #[error("input text is empty")]
    EmptyInput,

    #[error("API request failed: {0}")]
    Api(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("rate limited after {0} retries")]
    RateLimited(u32),

    #[error("network error: {0}")]
    Network(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::Disabled("openai".to_string());
        assert_eq!(err.to_string(), "provider 'openai' is disabled");

        let err = ProviderError::Missing("anthropic".to_string());
        assert!(err.to_string().contains("anthropic"));

        let err = ProviderError::EmptyInput;
        assert_eq!(err.to_string(), "input text is empty");
    }
}
