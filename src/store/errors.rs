//! Storage errors

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure talking to the storage engine. Never retried internally;
/// pool exhaustion is reported to the client as retryable.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unexpected result: {0}")]
    UnexpectedResult(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// True when the pool could not hand out a connection in time
    pub fn is_pool_timeout(&self) -> bool {
        matches!(self, StoreError::Database(sqlx::Error::PoolTimedOut))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_detected() {
        assert!(StoreError::Database(sqlx::Error::PoolTimedOut).is_pool_timeout());
        assert!(!StoreError::Unavailable("down".into()).is_pool_timeout());
    }
}
