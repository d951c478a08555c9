//! # Catalog Errors

use thiserror::Error;
use uuid::Uuid;

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Layer catalog errors
#[derive(Debug, Error)]
pub enum CatalogError {
    // ==================
    // Registry Errors
    // ==================
    /// Registry query failed
    #[error("Registry query failed: {0}")]
    Database(#[from] sqlx::Error),

    /// Registry source unavailable
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    /// Registry row cannot be turned into a layer definition
    #[error("Malformed layer {layer_id}: {reason}")]
    MalformedLayer { layer_id: Uuid, reason: String },

    // ==================
    // Notification Errors
    // ==================
    /// Payload is not `<OPERATION>:<layer_id>`
    #[error("Malformed notification payload: '{0}'")]
    MalformedEvent(String),

    /// Operation other than INSERT, UPDATE or DELETE
    #[error("Unknown catalog operation: '{0}'")]
    UnknownOperation(String),

    /// Layer id is not a UUID
    #[error("Invalid layer id: '{0}'")]
    InvalidLayerId(String),
}

impl CatalogError {
    pub fn malformed(layer_id: Uuid, reason: impl Into<String>) -> Self {
        CatalogError::MalformedLayer {
            layer_id,
            reason: reason.into(),
        }
    }

    /// The registry could not be read; the change may succeed later
    pub fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::Database(_) | CatalogError::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_failures_are_retryable() {
        assert!(CatalogError::Unavailable("down".into()).is_retryable());
        assert!(CatalogError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!CatalogError::malformed(Uuid::nil(), "bad").is_retryable());
        assert!(!CatalogError::UnknownOperation("TRUNCATE".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = CatalogError::malformed(Uuid::nil(), "duplicate exposed name 'a'");
        let display = err.to_string();
        assert!(display.contains("00000000-0000-0000-0000-000000000000"));
        assert!(display.contains("duplicate exposed name"));
    }
}
