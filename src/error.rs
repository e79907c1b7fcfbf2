// Error taxonomy shared by every component in this crate.
// Every documented failure mode gets a named variant so callers can match on
// kind rather than parse a message; the three enforced query validations keep
// the exact wording existing test suites grep for.

use thiserror::Error;

/// Unified error type returned by every public operation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("embedding failed: {0}")]
    EmbeddingFailed(#[source] anyhow::Error),

    #[error("failed to persist to disk: {0}")]
    PersistFailed(#[source] anyhow::Error),

    #[error("storage is corrupt: {0}")]
    CorruptStorage(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_validation_messages_are_grep_stable() {
        let empty_query = Error::invalid_argument("queryText is empty");
        assert_eq!(empty_query.to_string(), "queryText is empty");

        let bad_k = Error::invalid_argument("nResults must be > 0");
        assert_eq!(bad_k.to_string(), "nResults must be > 0");

        let k_too_large =
            Error::invalid_argument("nResults must be <= the number of documents in the collection");
        assert!(k_too_large
            .to_string()
            .contains("nResults must be <= the number of documents in the collection"));

        let bad_operator = Error::UnsupportedOperator("$regex".to_string());
        assert!(bad_operator.to_string().contains("unsupported operator"));
    }
}
