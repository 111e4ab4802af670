//! Data models for the session core.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod settings;

// Re-export commonly used types
pub use connection::{
    ConnectionParameters, ConnectionSummary, DRIVER_MYSQL, DRIVER_ORACLE, DRIVER_POSTGRES,
    DRIVER_SQLITE, DatabaseDescriptor, DatabaseKey, DatabaseType,
};
pub use settings::{
    BehaviorFlags, PlaceholderStyle, Setting, SettingTarget, SettingType, SettingValue,
};
