//! Driver layer seam.
//!
//! The session core never talks to a database directly: it asks a [`Driver`] to
//! open a [`RawConnection`] from resolved [`ConnectionParameters`] and keeps the
//! returned handle in its registry.

use crate::error::DbError;
use crate::models::{ConnectionParameters, DatabaseType};
use thiserror::Error;

/// Error reported by a driver, with the native code when the backend supplied one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", render(.message, .native_code))]
pub struct DriverError {
    pub message: String,
    pub native_code: Option<String>,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            native_code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, native_code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            native_code: Some(native_code.into()),
        }
    }

    /// Render as a formatted message: `Error number 'code' : text`.
    pub fn formatted(&self) -> String {
        render(&self.message, &self.native_code)
    }

    /// Convert into the session error surfaced to callers of `acquire()`.
    ///
    /// A driver error without any description becomes a generic open failure.
    pub fn into_open_error(self, params: &ConnectionParameters) -> DbError {
        if self.message.is_empty() && self.native_code.is_none() {
            return DbError::connection_open_failed(&params.driver_name, &params.database_name);
        }
        let suggestion = connection_suggestion(params.database_type(), &self.message);
        DbError::driver(self.formatted(), self.native_code, suggestion)
    }
}

fn render(message: &String, native_code: &Option<String>) -> String {
    let text = if message.is_empty() {
        "<no error description>"
    } else {
        message.as_str()
    };
    match native_code {
        Some(code) => format!("Error number '{}' : {}", code, text),
        None => text.to_string(),
    }
}

/// An opened, driver-level connection.
pub trait RawConnection: Send {
    /// False once the connection was closed or the backend dropped it.
    fn is_open(&self) -> bool;

    /// Execute a statement that returns no rows; yields the affected row count.
    fn execute(&mut self, sql: &str) -> Result<u64, DriverError>;

    /// Close the connection. Closing twice is a no-op.
    fn close(&mut self);
}

/// Opens raw connections for the session core.
pub trait Driver: Send + Sync {
    /// Open a new connection with the given parameters.
    fn open(&self, params: &ConnectionParameters) -> Result<Box<dyn RawConnection>, DriverError>;

    /// Release auxiliary connection pools held outside the session registry.
    fn clear_pools(&self) {}
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(db_type: Option<DatabaseType>, message: &str) -> String {
    let error_str = message.to_lowercase();

    if error_str.contains("connection refused") {
        let name = db_type.map(|t| t.display_name()).unwrap_or("database");
        return format!("Check that the {} server is running and accessible", name);
    }

    if error_str.contains("authentication")
        || error_str.contains("password")
        || error_str.contains("access denied")
    {
        return "Verify the user name and password".to_string();
    }

    if error_str.contains("does not exist") || error_str.contains("unknown database") {
        return "Check that the database name exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }

    match db_type {
        Some(t @ (DatabaseType::PostgreSQL | DatabaseType::MySQL)) => match t.default_port() {
            Some(port) => format!("Verify host, port (default {}) and database name", port),
            None => "Verify host, port and database name".to_string(),
        },
        Some(DatabaseType::SQLite) => {
            "Verify the database file path exists and is accessible".to_string()
        }
        Some(DatabaseType::Oracle) => "Oracle connections need a driver with OCI support".to_string(),
        None => "Check the driver name".to_string(),
    }
}
