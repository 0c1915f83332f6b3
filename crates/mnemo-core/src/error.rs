//! Error types for mnemo-core.

use thiserror::Error;

/// Result type alias using mnemo-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for memory lifecycle and recall operations
#[derive(Error, Debug)]
pub enum Error {
    /// A required argument was missing or malformed
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Entity (record, query, digest) not found
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    /// A batch or buffer exceeded its configured bound
    #[error("resource exhausted: {message}")]
    ResourceExhausted { message: String },

    /// A storage or retrieval backend failed
    #[error("{backend} backend failed: {message}")]
    Backend { backend: String, message: String },

    /// A digest was stored but its source records were not flagged archived
    #[error("digest {digest_id} stored but archive flag update failed: {message}")]
    ConsistencyRisk { digest_id: String, message: String },

    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigValidationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create a resource exhaustion error
    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            message: message.into(),
        }
    }

    /// Create a backend failure error
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a consistency risk error
    pub fn consistency_risk(digest_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConsistencyRisk {
            digest_id: digest_id.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is an invalid input error
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }

    /// Check if this error is a consistency risk
    pub fn is_consistency_risk(&self) -> bool {
        matches!(self, Self::ConsistencyRisk { .. })
    }

    /// Check if this error came from a backend (including the database)
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            Self::Backend { .. } | Self::Database(_) | Self::LockPoisoned | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::invalid_input("owner is required");
        assert!(err.to_string().contains("owner is required"));
        assert!(err.is_invalid_input());

        let err = Error::not_found("record", "abc");
        assert_eq!(err.to_string(), "record not found: abc");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::backend("vector", "down").is_backend());
        assert!(Error::timeout(500).is_backend());
        assert!(!Error::not_found("query", "").is_backend());

        let err = Error::consistency_risk("d-1", "disk full");
        assert!(err.is_consistency_risk());
        assert!(err.to_string().contains("d-1"));
    }
}
