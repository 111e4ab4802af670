//! DB Session Library
//!
//! Hands each execution thread its own lazily opened SQL connection, resolves
//! connection parameters and behavior flags through database, thread and global
//! scopes, and selects the SQL dialect generator for the active driver.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::Config;
pub use db::{Connection, SessionManager, SqlxDriver};
pub use error::{DbError, DbResult};
