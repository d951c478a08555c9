//! Filter compilation errors
//!
//! Every variant is a user-input error: the request is rejected and nothing
//! is sent to the database.

use thiserror::Error;

pub type FilterResult<T> = Result<T, FilterError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("Invalid property name: {0}")]
    InvalidPropertyName(String),

    #[error("Must have timestamp typed column to filter with datetime.")]
    MissingDatetimeColumn,

    #[error("Invalid Datetime Column: {0}.")]
    InvalidDatetimeColumnName(String),

    #[error("Invalid datetime: {0}")]
    InvalidDatetime(String),

    #[error("Invalid bbox: {0}")]
    InvalidBbox(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}

impl FilterError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        FilterError::InvalidFilter(reason.into())
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            FilterError::InvalidPropertyName(_) => "InvalidPropertyName",
            FilterError::MissingDatetimeColumn => "MissingDatetimeColumn",
            FilterError::InvalidDatetimeColumnName(_) => "InvalidDatetimeColumnName",
            FilterError::InvalidDatetime(_) => "InvalidDatetime",
            FilterError::InvalidBbox(_) => "InvalidBbox",
            FilterError::InvalidFilter(_) => "InvalidFilter",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(
            FilterError::InvalidPropertyName("x".into()).code(),
            "InvalidPropertyName"
        );
        assert_eq!(FilterError::MissingDatetimeColumn.code(), "MissingDatetimeColumn");
        assert_eq!(FilterError::invalid("arity").to_string(), "Invalid filter: arity");
    }
}
