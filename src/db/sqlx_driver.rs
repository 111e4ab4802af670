//! sqlx-backed driver.
//!
//! Opens single, unpooled sqlx connections and drives them from synchronous
//! callers through a shared multi-thread tokio runtime. Must not be called from
//! inside an async context.

use crate::db::driver::{Driver, DriverError, RawConnection};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionParameters, DatabaseType};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlSslMode};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions as _, Connection as _};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

/// Default busy timeout for SQLite connections in seconds.
const SQLITE_BUSY_TIMEOUT_SECS: u64 = 5;

impl From<sqlx::Error> for DriverError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => match db_err.code() {
                Some(code) => DriverError::with_code(db_err.message(), code.into_owned()),
                None => DriverError::new(db_err.message()),
            },
            _ => DriverError::new(err.to_string()),
        }
    }
}

/// Driver opening MySQL, PostgreSQL and SQLite connections with sqlx.
pub struct SqlxDriver {
    runtime: Arc<Runtime>,
}

impl SqlxDriver {
    pub fn new() -> DbResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("db-session-io")
            .enable_all()
            .build()
            .map_err(|e| DbError::internal(format!("Failed to start async runtime: {}", e)))?;
        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }

    fn mysql_options(params: &ConnectionParameters) -> Result<MySqlConnectOptions, DriverError> {
        let mut options = MySqlConnectOptions::new()
            .database(&params.database_name)
            .charset("utf8mb4");
        if !params.host_name.is_empty() {
            options = options.host(&params.host_name);
        }
        if let Some(port) = params.port {
            options = options.port(port);
        }
        if !params.user_name.is_empty() {
            options = options.username(&params.user_name);
        }
        if !params.password.is_empty() {
            options = options.password(&params.password);
        }
        for (key, value) in params.connect_option_pairs() {
            match key.to_ascii_lowercase().as_str() {
                "charset" => options = options.charset(&value),
                "ssl_mode" | "ssl-mode" | "sslmode" => {
                    let mode = MySqlSslMode::from_str(&value).map_err(|e| {
                        DriverError::new(format!("Invalid ssl mode '{}': {}", value, e))
                    })?;
                    options = options.ssl_mode(mode);
                }
                _ => warn!(option = %key, "Ignoring unsupported MySQL connect option"),
            }
        }
        Ok(options)
    }

    fn postgres_options(params: &ConnectionParameters) -> Result<PgConnectOptions, DriverError> {
        let mut options = PgConnectOptions::new().database(&params.database_name);
        if !params.host_name.is_empty() {
            options = options.host(&params.host_name);
        }
        if let Some(port) = params.port {
            options = options.port(port);
        }
        if !params.user_name.is_empty() {
            options = options.username(&params.user_name);
        }
        if !params.password.is_empty() {
            options = options.password(&params.password);
        }
        for (key, value) in params.connect_option_pairs() {
            match key.to_ascii_lowercase().as_str() {
                "sslmode" | "ssl_mode" | "requiressl" => {
                    let mode = if key.eq_ignore_ascii_case("requiressl") {
                        if value == "1" { PgSslMode::Require } else { PgSslMode::Prefer }
                    } else {
                        PgSslMode::from_str(&value).map_err(|e| {
                            DriverError::new(format!("Invalid ssl mode '{}': {}", value, e))
                        })?
                    };
                    options = options.ssl_mode(mode);
                }
                "application_name" => options = options.application_name(&value),
                _ => warn!(option = %key, "Ignoring unsupported PostgreSQL connect option"),
            }
        }
        Ok(options)
    }

    fn sqlite_options(params: &ConnectionParameters) -> Result<SqliteConnectOptions, DriverError> {
        let mut options = if params.database_name == ":memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            SqliteConnectOptions::new()
                .filename(&params.database_name)
                .create_if_missing(true)
        };
        options = options.busy_timeout(Duration::from_secs(SQLITE_BUSY_TIMEOUT_SECS));
        for (key, value) in params.connect_option_pairs() {
            match key.to_ascii_uppercase().as_str() {
                "QSQLITE_OPEN_READONLY" | "READ_ONLY" => {
                    let read_only = parse_flag(&value);
                    options = options.read_only(read_only);
                    if read_only {
                        options = options.create_if_missing(false);
                    }
                }
                "MODE" => match value.to_ascii_lowercase().as_str() {
                    "ro" => options = options.read_only(true).create_if_missing(false),
                    "rw" => options = options.read_only(false).create_if_missing(false),
                    "rwc" => options = options.read_only(false).create_if_missing(true),
                    _ => {
                        return Err(DriverError::new(format!(
                            "Invalid SQLite mode '{}' (expected ro, rw or rwc)",
                            value
                        )));
                    }
                },
                "QSQLITE_BUSY_TIMEOUT" | "BUSY_TIMEOUT" => {
                    let millis = value.parse::<u64>().map_err(|_| {
                        DriverError::new(format!("Invalid busy timeout '{}'", value))
                    })?;
                    options = options.busy_timeout(Duration::from_millis(millis));
                }
                "CREATE_IF_MISSING" => {
                    options = options.create_if_missing(parse_flag(&value));
                }
                _ => warn!(option = %key, "Ignoring unsupported SQLite connect option"),
            }
        }
        Ok(options)
    }
}

fn parse_flag(value: &str) -> bool {
    value.is_empty() || matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl Driver for SqlxDriver {
    fn open(&self, params: &ConnectionParameters) -> Result<Box<dyn RawConnection>, DriverError> {
        let db_type = params.database_type().ok_or_else(|| {
            DriverError::new(format!("Driver '{}' is not available", params.driver_name))
        })?;
        debug!(driver = %db_type, database = %params.database_name, "Opening sqlx connection");

        let conn = match db_type {
            DatabaseType::MySQL => {
                let options = Self::mysql_options(params)?;
                SqlxConnection::MySql(self.runtime.block_on(options.connect())?)
            }
            DatabaseType::PostgreSQL => {
                let options = Self::postgres_options(params)?;
                SqlxConnection::Postgres(self.runtime.block_on(options.connect())?)
            }
            DatabaseType::SQLite => {
                let options = Self::sqlite_options(params)?;
                SqlxConnection::SQLite(self.runtime.block_on(options.connect())?)
            }
            DatabaseType::Oracle => {
                return Err(DriverError::new(
                    "Oracle connections are not supported by the sqlx driver",
                ));
            }
        };

        Ok(Box::new(SqlxRawConnection {
            conn: Some(conn),
            runtime: self.runtime.clone(),
        }))
    }
}

impl std::fmt::Debug for SqlxDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlxDriver").finish_non_exhaustive()
    }
}

enum SqlxConnection {
    MySql(MySqlConnection),
    Postgres(PgConnection),
    SQLite(SqliteConnection),
}

struct SqlxRawConnection {
    conn: Option<SqlxConnection>,
    runtime: Arc<Runtime>,
}

impl RawConnection for SqlxRawConnection {
    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn execute(&mut self, sql: &str) -> Result<u64, DriverError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| DriverError::new("Connection is closed"))?;
        let rows = match conn {
            SqlxConnection::MySql(c) => self
                .runtime
                .block_on(sqlx::query(sql).execute(&mut *c))?
                .rows_affected(),
            SqlxConnection::Postgres(c) => self
                .runtime
                .block_on(sqlx::query(sql).execute(&mut *c))?
                .rows_affected(),
            SqlxConnection::SQLite(c) => self
                .runtime
                .block_on(sqlx::query(sql).execute(&mut *c))?
                .rows_affected(),
        };
        Ok(rows)
    }

    fn close(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let result = match conn {
            SqlxConnection::MySql(c) => self.runtime.block_on(c.close()),
            SqlxConnection::Postgres(c) => self.runtime.block_on(c.close()),
            SqlxConnection::SQLite(c) => self.runtime.block_on(c.close()),
        };
        if let Err(e) = result {
            warn!(error = %e, "Error while closing connection");
        }
    }
}
