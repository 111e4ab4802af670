//! Connection-related data models.
//!
//! This module defines the parameters needed to open a connection, the descriptor
//! used to key per-database overrides, and the summary exposed for registry listings.

use serde::{Deserialize, Serialize};

/// Driver identifier for MySQL / MariaDB.
pub const DRIVER_MYSQL: &str = "QMYSQL";
/// Driver identifier for PostgreSQL.
pub const DRIVER_POSTGRES: &str = "QPSQL";
/// Driver identifier for SQLite.
pub const DRIVER_SQLITE: &str = "QSQLITE";
/// Driver identifier for Oracle.
pub const DRIVER_ORACLE: &str = "QOCI";

/// Database families known to the session core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
    Oracle,
}

impl DatabaseType {
    /// Map a driver identifier to a database type (exact match).
    pub fn from_driver_name(driver_name: &str) -> Option<Self> {
        match driver_name {
            DRIVER_MYSQL => Some(Self::MySQL),
            DRIVER_POSTGRES => Some(Self::PostgreSQL),
            DRIVER_SQLITE => Some(Self::SQLite),
            DRIVER_ORACLE => Some(Self::Oracle),
            _ => None,
        }
    }

    /// Parse database type from a URL scheme.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::PostgreSQL),
            "mysql" | "mariadb" => Some(Self::MySQL),
            "sqlite" => Some(Self::SQLite),
            "oracle" => Some(Self::Oracle),
            _ => None,
        }
    }

    /// Driver identifier used in [`ConnectionParameters::driver_name`].
    pub fn driver_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => DRIVER_POSTGRES,
            Self::MySQL => DRIVER_MYSQL,
            Self::SQLite => DRIVER_SQLITE,
            Self::Oracle => DRIVER_ORACLE,
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
            Self::Oracle => "Oracle",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::Oracle => Some(1521),
            Self::SQLite => None,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Attributes needed to open one connection.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParameters {
    pub driver_name: String,
    /// Driver-specific options, `key=value` pairs separated by `;`
    #[serde(default)]
    pub connect_options: String,
    pub database_name: String,
    #[serde(default)]
    pub user_name: String,
    /// Contains sensitive data - never log
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub host_name: String,
    #[serde(default)]
    pub port: Option<u16>,
}

impl ConnectionParameters {
    /// Both the driver and the database name must be present to open a connection.
    pub fn is_valid(&self) -> bool {
        !self.driver_name.is_empty() && !self.database_name.is_empty()
    }

    /// Database type for the configured driver, if it is a known one.
    pub fn database_type(&self) -> Option<DatabaseType> {
        DatabaseType::from_driver_name(&self.driver_name)
    }

    /// Descriptor identifying the database these parameters point at.
    pub fn descriptor(&self) -> DatabaseDescriptor {
        DatabaseDescriptor::new(&self.driver_name, &self.host_name, &self.database_name)
    }

    /// Split `connect_options` into trimmed `(key, value)` pairs.
    ///
    /// A bare key (no `=`) yields an empty value.
    pub fn connect_option_pairs(&self) -> Vec<(String, String)> {
        self.connect_options
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|opt| match opt.split_once('=') {
                Some((k, v)) => (k.trim().to_string(), v.trim().to_string()),
                None => (opt.to_string(), String::new()),
            })
            .collect()
    }
}

impl std::fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let password = if self.password.is_empty() { "" } else { "****" };
        f.debug_struct("ConnectionParameters")
            .field("driver_name", &self.driver_name)
            .field("connect_options", &self.connect_options)
            .field("database_name", &self.database_name)
            .field("user_name", &self.user_name)
            .field("password", &password)
            .field("host_name", &self.host_name)
            .field("port", &self.port)
            .finish()
    }
}

/// Identifies a database independently of credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatabaseDescriptor {
    pub driver_name: String,
    pub host_name: String,
    pub database_name: String,
}

impl DatabaseDescriptor {
    pub fn new(
        driver_name: impl Into<String>,
        host_name: impl Into<String>,
        database_name: impl Into<String>,
    ) -> Self {
        Self {
            driver_name: driver_name.into(),
            host_name: host_name.into(),
            database_name: database_name.into(),
        }
    }

    /// Key used for per-database overrides and markers.
    pub fn key(&self) -> DatabaseKey {
        DatabaseKey::new(&self.driver_name, &self.host_name, &self.database_name)
    }
}

/// Driver name + host name + database name, compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatabaseKey(String);

impl DatabaseKey {
    pub fn new(driver_name: &str, host_name: &str, database_name: &str) -> Self {
        let mut key = String::with_capacity(driver_name.len() + host_name.len() + database_name.len());
        key.push_str(driver_name);
        key.push_str(host_name);
        key.push_str(database_name);
        Self(key.to_uppercase())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DatabaseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry entry information returned by listings (no secrets exposed).
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    /// Owning thread, as reported by the thread token
    pub thread: String,
    /// Unique connection key minted when the connection was opened
    pub key: String,
    pub driver_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub host_name: String,
    pub database_name: String,
    pub opened_at: chrono::DateTime<chrono::Utc>,
    pub open: bool,
}
