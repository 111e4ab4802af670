//! Error types for the database session core.
//!
//! Every failure is returned to the caller as a [`DbError`]; nothing in this crate
//! retries or reconnects on its own. Programmer-error variants are additionally
//! reported through [`report_fault`] so they show up while debugging.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid connection parameters: {message}")]
    InvalidParameters { message: String },

    #[error("Unable to determine the current thread id")]
    ThreadIdUnavailable,

    #[error("Unable to open connection to database '{database}' (driver: {driver})")]
    ConnectionOpenFailed { driver: String, database: String },

    /// Native error reported by the driver layer.
    #[error("Driver error: {message}")]
    Driver {
        message: String,
        /// e.g., "28000" for an authentication failure
        native_code: Option<String>,
        suggestion: String,
    },

    #[error("Usage error: {message}")]
    Usage { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create an invalid parameters error.
    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::InvalidParameters {
            message: message.into(),
        }
    }

    /// Create a generic open failure (the driver gave no description).
    pub fn connection_open_failed(driver: impl Into<String>, database: impl Into<String>) -> Self {
        Self::ConnectionOpenFailed {
            driver: driver.into(),
            database: database.into(),
        }
    }

    /// Create a driver error with an optional native code.
    pub fn driver(
        message: impl Into<String>,
        native_code: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Driver {
            message: message.into(),
            native_code,
            suggestion: suggestion.into(),
        }
    }

    /// Create a usage error.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Driver { suggestion, .. } => Some(suggestion),
            Self::InvalidParameters { .. } => {
                Some("Set both the driver name and the database name before acquiring")
            }
            Self::Usage { .. } => Some("Pass a descriptor with a driver, host or database name"),
            _ => None,
        }
    }

    /// Native code reported by the driver, if any.
    pub fn native_code(&self) -> Option<&str> {
        match self {
            Self::Driver { native_code, .. } => native_code.as_deref(),
            _ => None,
        }
    }

    /// True for errors caused by misuse of the API rather than the environment.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameters { .. } | Self::ThreadIdUnavailable | Self::Usage { .. }
        )
    }
}

/// Result type alias for session operations.
pub type DbResult<T> = Result<T, DbError>;

/// Report a programmer error without changing what the caller gets back.
///
/// Always logged; with the `strict-assertions` feature it also trips a debug assertion.
pub(crate) fn report_fault(err: &DbError) {
    tracing::error!(error = %err, "Session usage fault");
    #[cfg(feature = "strict-assertions")]
    debug_assert!(false, "{err}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::invalid_parameters("database name is empty");
        assert!(err.to_string().contains("Invalid connection parameters"));
    }

    #[test]
    fn test_driver_error_suggestion_and_code() {
        let err = DbError::driver(
            "Access denied",
            Some("28000".to_string()),
            "Verify the user name and password",
        );
        assert_eq!(err.suggestion(), Some("Verify the user name and password"));
        assert_eq!(err.native_code(), Some("28000"));
    }

    #[test]
    fn test_open_failed_mentions_database() {
        let err = DbError::connection_open_failed("QSQLITE", "app.db");
        let msg = err.to_string();
        assert!(msg.contains("app.db"));
        assert!(msg.contains("QSQLITE"));
        assert!(err.native_code().is_none());
    }

    #[test]
    fn test_programmer_errors() {
        assert!(DbError::invalid_parameters("x").is_programmer_error());
        assert!(DbError::ThreadIdUnavailable.is_programmer_error());
        assert!(DbError::usage("x").is_programmer_error());
        assert!(!DbError::connection_open_failed("QPSQL", "db").is_programmer_error());
        assert!(!DbError::driver("refused", None, "retry").is_programmer_error());
    }
}
