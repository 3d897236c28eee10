use std::fmt;
use thiserror::Error;

/// Message shown to callers when a report fails for a reason they cannot act on.
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred.";

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Permission(String),

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Upstream failure with the diagnostic detail kept out of `Display`.
    #[error("An unexpected error occurred.")]
    Unexpected { context: String, detail: String },
}

impl Error {
    /// Convert an error raised while computing a report into what the caller
    /// may see. Permission, validation and lookup errors pass through; anything
    /// else is logged in full and replaced by the generic message.
    pub fn into_report_error(self, context: &str) -> Error {
        match self {
            Error::Unexpected { .. } => self,
            caller if caller.is_caller_error() => caller,
            other => {
                log::error!("{context} failed: {other}");
                Error::Unexpected {
                    context: context.to_string(),
                    detail: other.to_string(),
                }
            }
        }
    }

    /// True for errors the caller caused (as opposed to upstream failures).
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::Permission(_) | Error::Validation(_) | Error::NotFound(_)
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidRecord(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_error_hides_upstream_detail() {
        let err = Error::Database("no such table: crm_tasks".into()).into_report_error("exception report");
        assert_eq!(err.to_string(), UNEXPECTED_ERROR_MESSAGE);
        match err {
            Error::Unexpected { context, detail } => {
                assert_eq!(context, "exception report");
                assert!(detail.contains("no such table"));
            }
            e => panic!("expected Unexpected, got {e:?}"),
        }
    }

    #[test]
    fn test_report_error_keeps_caller_errors() {
        let err = Error::Permission("You do not have permission to create new users.".into())
            .into_report_error("create user");
        assert!(err.is_caller_error());
        assert_eq!(
            err.to_string(),
            "You do not have permission to create new users."
        );

        let err = Error::Validation("bad filter".into()).into_report_error("sales tasks");
        assert_eq!(err.to_string(), "bad filter");
    }
}
