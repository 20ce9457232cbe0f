//! Error types for the Synapse graph engine.

/// Result type alias for Synapse operations.
pub type Result<T> = std::result::Result<T, SynapseError>;

/// Main error type for the Synapse graph engine.
#[derive(Debug, thiserror::Error)]
pub enum SynapseError {
    /// Storage layer errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database connection errors
    #[error("Database error: {0}")]
    Database(String),

    /// Unique-constraint race on insert, resolved by re-read
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Not found errors
    #[error("Not found: {resource} with key {key}")]
    NotFound { resource: String, key: String },

    /// Invalid input: out-of-range value, unknown enum variant, missing field
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid parameter combination
    #[error("Logic error: {0}")]
    Logic(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped anyhow errors for compatibility
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SynapseError {
    /// Create a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a new conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a new not found error
    pub fn not_found(resource: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            key: key.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new logic error
    pub fn logic(msg: impl Into<String>) -> Self {
        Self::Logic(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classify a raw database error message. Unique-index violations
    /// become `Conflict` so find-or-create paths can resolve them by re-read.
    pub fn from_db_message(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        if msg.contains("already contains")
            || msg.contains("already exists")
            || msg.contains("read or write conflict")
        {
            Self::Conflict(msg)
        } else {
            Self::Database(msg)
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a unique-constraint conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Check if the operation may succeed on retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict(_) | Self::Database(_) | Self::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_classification() {
        let err = SynapseError::from_db_message(
            "Database index `nodes_type_name` already contains ['function', 'foo']",
        );
        assert!(err.is_conflict());
        assert!(err.is_retryable());

        let err = SynapseError::from_db_message("connection refused");
        assert!(!err.is_conflict());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_not_found_display() {
        let err = SynapseError::not_found("node", "function:foo");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found: node with key function:foo");
    }
}
