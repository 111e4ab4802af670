//! Database session layer.
//!
//! - Per-thread connection registry
//! - Three-tier setting overrides (database, thread, global)
//! - SQL dialect selection
//! - Driver seam and the sqlx-backed driver

pub mod dialect;
pub mod driver;
#[macro_use]
pub mod macros;
pub mod registry;
pub mod session;
pub mod settings;
pub mod sqlx_driver;

pub use dialect::{
    DialectSelector, GeneratorFactory, MySqlGenerator, OracleGenerator, PostgresGenerator,
    SqlGenerator, SqliteGenerator, StandardGenerator, builtin_generator,
};
pub use driver::{Driver, DriverError, RawConnection};
pub use registry::{Connection, ConnectionKey, ConnectionRegistry, ThreadToken};
pub use session::{DatabaseScope, OpenHook, SessionManager};
pub use settings::{SetOutcome, SettingResolver};
pub use sqlx_driver::SqlxDriver;
