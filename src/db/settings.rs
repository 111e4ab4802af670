//! Three-tier setting overrides.
//!
//! Lookup order is per-database (keyed by the thread's current database marker),
//! then per-thread, then the caller's global default. Each tier is an independent
//! map so a single `set` can write both a thread and a database override.

use crate::db::registry::ThreadToken;
use crate::error::{DbError, DbResult, report_fault};
use crate::models::{DatabaseDescriptor, DatabaseKey, Setting, SettingTarget, SettingValue};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Outcome of [`SettingResolver::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// No scoped target: the caller writes its global default.
    UpdateGlobal,
    /// Stored in the thread and/or database tier; global untouched.
    Scoped,
}

#[derive(Default)]
pub struct SettingResolver {
    by_thread: RwLock<HashMap<(ThreadToken, Setting), SettingValue>>,
    by_database: RwLock<HashMap<(DatabaseKey, Setting), SettingValue>>,
    current_database: RwLock<HashMap<ThreadToken, DatabaseKey>>,
}

impl SettingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scoped override for `setting` as seen from the calling thread.
    pub fn get(&self, setting: Setting) -> Option<SettingValue> {
        let thread = ThreadToken::current().ok()?;
        self.get_for(thread, setting)
    }

    fn get_for(&self, thread: ThreadToken, setting: Setting) -> Option<SettingValue> {
        {
            let by_database = self.by_database.read();
            if !by_database.is_empty() {
                if let Some(key) = self.current_database_for(thread) {
                    if let Some(value) = by_database.get(&(key, setting)) {
                        return Some(value.clone());
                    }
                }
            }
        }
        let by_thread = self.by_thread.read();
        if by_thread.is_empty() {
            return None;
        }
        by_thread.get(&(thread, setting)).cloned()
    }

    /// Store an override in the tiers selected by `target`.
    ///
    /// The database key is checked before anything is written, so a failed call
    /// leaves every tier as it was.
    pub fn set(
        &self,
        setting: Setting,
        value: SettingValue,
        target: SettingTarget<'_>,
    ) -> DbResult<SetOutcome> {
        if target.is_global() {
            return Ok(SetOutcome::UpdateGlobal);
        }
        let database_key = match target.database {
            Some(descriptor) => Some(Self::database_key(descriptor, setting.as_str())?),
            None => None,
        };
        if target.current_thread {
            let thread = ThreadToken::current().inspect_err(report_fault)?;
            debug!(thread = %thread, setting = %setting, "Setting thread override");
            self.by_thread
                .write()
                .insert((thread, setting), value.clone());
        }
        if let Some(key) = database_key {
            debug!(database = %key, setting = %setting, "Setting database override");
            self.by_database.write().insert((key, setting), value);
        }
        Ok(SetOutcome::Scoped)
    }

    /// Key for a per-database target; an empty key is a usage error.
    pub fn database_key(descriptor: &DatabaseDescriptor, what: &str) -> DbResult<DatabaseKey> {
        let key = descriptor.key();
        if key.is_empty() {
            let err = DbError::usage(format!(
                "database parameters are empty, cannot add database setting '{}'",
                what
            ));
            report_fault(&err);
            return Err(err);
        }
        Ok(key)
    }

    /// True when no scoped override exists at all.
    pub fn is_empty(&self) -> bool {
        self.by_thread.read().is_empty() && self.by_database.read().is_empty()
    }

    /// Database marker of `thread`, if one is active.
    pub fn current_database_for(&self, thread: ThreadToken) -> Option<DatabaseKey> {
        let markers = self.current_database.read();
        if markers.is_empty() {
            return None;
        }
        markers.get(&thread).cloned()
    }

    /// Install `key` as the marker of `thread` unless it already has one.
    pub fn mark_current_database(&self, thread: ThreadToken, key: DatabaseKey) -> bool {
        let mut markers = self.current_database.write();
        if key.is_empty() || markers.contains_key(&thread) {
            return false;
        }
        markers.insert(thread, key);
        true
    }

    pub fn clear_current_database(&self, thread: ThreadToken) {
        let mut markers = self.current_database.write();
        if !markers.is_empty() {
            markers.remove(&thread);
        }
    }

    /// Drop every thread override of `thread`.
    pub fn clear_thread(&self, thread: ThreadToken) {
        self.by_thread.write().retain(|(t, _), _| *t != thread);
    }

    /// Drop every database override of `key`.
    pub fn clear_database(&self, key: &DatabaseKey) {
        self.by_database.write().retain(|(k, _), _| k != key);
    }
}
