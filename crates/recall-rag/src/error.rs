//! Error taxonomy for the RAG pipeline.

use recall_providers::ProviderError;
use thiserror::Error;

/// Errors that can occur in the RAG pipeline.
///
/// Propagation policy: `Provider` and `Store` errors are recovered at
/// component boundaries and degrade retrieval quality, not availability.
/// `Validation` errors are raised before any external call. `Job` errors
/// mark a bulk-indexing job `Failed` and are never seen by query callers.
#[derive(Error, Debug)]
pub enum RagError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("store error: {0}")]
    Store(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("job error: {0}")]
    Job(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_converts() {
        let err: RagError = ProviderError::EmptyInput.into();
        assert!(matches!(err, RagError::Provider(_)));
    }

    #[test]
    fn test_display() {
        let err = RagError::Validation("query is empty".to_string());
        assert_eq!(err.to_string(), "validation error: query is empty");

        let err = RagError::Store("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }
}
