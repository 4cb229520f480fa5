//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid chunk size: {size} (must be at least {min})")]
    InvalidChunkSize { size: usize, min: usize },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_offending_value() {
        let err = Error::InvalidChunkSize { size: 1024, min: 5 * 1024 * 1024 };
        assert_eq!(
            err.to_string(),
            "invalid chunk size: 1024 (must be at least 5242880)"
        );

        let err = Error::Config("unknown storage type".to_string());
        assert_eq!(err.to_string(), "configuration error: unknown storage type");
    }
}
