//! Per-thread connection registry.
//!
//! Maps each execution thread to the one connection it owns. The registry itself
//! only stores and hands out handles; the lookup-or-create transaction is driven by
//! [`SessionManager::acquire`](crate::db::SessionManager::acquire) under the session lock.

use crate::db::driver::{DriverError, RawConnection};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionSummary, DatabaseDescriptor};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

thread_local! {
    static CURRENT_THREAD: ThreadToken = ThreadToken(std::thread::current().id());
}

/// Opaque identity of an execution thread, stable for the thread's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadToken(std::thread::ThreadId);

impl ThreadToken {
    /// Token of the calling thread.
    ///
    /// Fails only while the thread's locals are being torn down.
    pub fn current() -> DbResult<Self> {
        CURRENT_THREAD
            .try_with(|token| *token)
            .map_err(|_| DbError::ThreadIdUnavailable)
    }
}

impl std::fmt::Display for ThreadToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Globally unique connection key, minted once per opened connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionKey(Uuid);

impl ConnectionKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionKey {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.0)
    }
}

struct ConnectionInner {
    key: ConnectionKey,
    owner: ThreadToken,
    descriptor: DatabaseDescriptor,
    opened_at: DateTime<Utc>,
    raw: Mutex<Box<dyn RawConnection>>,
}

/// Shared handle to an open database connection.
///
/// Cloning is cheap; all clones refer to the same underlying connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub(crate) fn new(
        key: ConnectionKey,
        owner: ThreadToken,
        descriptor: DatabaseDescriptor,
        raw: Box<dyn RawConnection>,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                key,
                owner,
                descriptor,
                opened_at: Utc::now(),
                raw: Mutex::new(raw),
            }),
        }
    }

    pub fn key(&self) -> ConnectionKey {
        self.inner.key
    }

    /// Thread the connection was opened for.
    pub fn owner(&self) -> ThreadToken {
        self.inner.owner
    }

    pub fn descriptor(&self) -> &DatabaseDescriptor {
        &self.inner.descriptor
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.inner.opened_at
    }

    pub fn is_open(&self) -> bool {
        self.inner.raw.lock().is_open()
    }

    /// Execute a statement that returns no rows.
    pub fn execute(&self, sql: &str) -> Result<u64, DriverError> {
        self.inner.raw.lock().execute(sql)
    }

    pub fn close(&self) {
        self.inner.raw.lock().close();
    }

    /// True if both handles refer to the same underlying connection.
    pub fn same_connection(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            thread: self.inner.owner.to_string(),
            key: self.inner.key.to_string(),
            driver_name: self.inner.descriptor.driver_name.clone(),
            host_name: self.inner.descriptor.host_name.clone(),
            database_name: self.inner.descriptor.database_name.clone(),
            opened_at: self.inner.opened_at,
            open: self.is_open(),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("key", &self.inner.key)
            .field("owner", &self.inner.owner)
            .field("descriptor", &self.inner.descriptor)
            .field("opened_at", &self.inner.opened_at)
            .finish_non_exhaustive()
    }
}

/// Thread → connection map. At most one entry per thread.
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: Mutex<HashMap<ThreadToken, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered connection for `thread`, whether or not it is still open.
    pub fn get(&self, thread: ThreadToken) -> Option<Connection> {
        self.entries.lock().get(&thread).cloned()
    }

    /// Registered connection for `thread`, only if its raw handle is still open.
    pub fn live(&self, thread: ThreadToken) -> Option<Connection> {
        let conn = self.get(thread)?;
        if conn.is_open() {
            Some(conn)
        } else {
            debug!(thread = %thread, key = %conn.key(), "Registered connection is no longer open");
            None
        }
    }

    /// Register `conn` for `thread`, returning the entry it replaced.
    pub fn insert(&self, thread: ThreadToken, conn: Connection) -> Option<Connection> {
        self.entries.lock().insert(thread, conn)
    }

    /// Close every registered connection and empty the registry.
    pub fn close_all(&self) -> usize {
        let drained: Vec<(ThreadToken, Connection)> = self.entries.lock().drain().collect();
        let count = drained.len();
        for (thread, conn) in drained {
            info!(thread = %thread, key = %conn.key(), "Closing connection");
            conn.close();
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn summaries(&self) -> Vec<ConnectionSummary> {
        let conns: Vec<Connection> = self.entries.lock().values().cloned().collect();
        conns.iter().map(Connection::summary).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlagConnection {
        open: Arc<AtomicBool>,
    }

    impl RawConnection for FlagConnection {
        fn is_open(&self) -> bool {
            self.open.load(Ordering::Acquire)
        }

        fn execute(&mut self, _sql: &str) -> Result<u64, DriverError> {
            Ok(0)
        }

        fn close(&mut self) {
            self.open.store(false, Ordering::Release);
        }
    }

    fn connection(owner: ThreadToken) -> (Connection, Arc<AtomicBool>) {
        let open = Arc::new(AtomicBool::new(true));
        let conn = Connection::new(
            ConnectionKey::new(),
            owner,
            DatabaseDescriptor::new("QSQLITE", "", "test.db"),
            Box::new(FlagConnection { open: open.clone() }),
        );
        (conn, open)
    }

    #[test]
    fn test_thread_token_is_stable_per_thread() {
        let a = ThreadToken::current().unwrap();
        let b = ThreadToken::current().unwrap();
        assert_eq!(a, b);
        let other = std::thread::spawn(|| ThreadToken::current().unwrap())
            .join()
            .unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn test_connection_keys_are_unique() {
        assert_ne!(ConnectionKey::new(), ConnectionKey::new());
    }

    #[test]
    fn test_live_skips_closed_connection() {
        let registry = ConnectionRegistry::new();
        let thread = ThreadToken::current().unwrap();
        let (conn, open) = connection(thread);
        registry.insert(thread, conn);
        assert!(registry.live(thread).is_some());
        open.store(false, Ordering::Release);
        assert!(registry.live(thread).is_none());
        assert!(registry.get(thread).is_some());
    }

    #[test]
    fn test_insert_replaces_previous_entry() {
        let registry = ConnectionRegistry::new();
        let thread = ThreadToken::current().unwrap();
        let (first, _) = connection(thread);
        let (second, _) = connection(thread);
        assert!(registry.insert(thread, first.clone()).is_none());
        let replaced = registry.insert(thread, second).unwrap();
        assert!(replaced.same_connection(&first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_close_all_closes_and_empties() {
        let registry = ConnectionRegistry::new();
        let thread = ThreadToken::current().unwrap();
        let (conn, open) = connection(thread);
        registry.insert(thread, conn);
        assert_eq!(registry.close_all(), 1);
        assert!(registry.is_empty());
        assert!(!open.load(Ordering::Acquire));
    }

    #[test]
    fn test_summary_has_no_secrets() {
        let thread = ThreadToken::current().unwrap();
        let (conn, _) = connection(thread);
        let summary = conn.summary();
        assert_eq!(summary.database_name, "test.db");
        assert_eq!(summary.key, conn.key().to_string());
        assert!(summary.open);
    }
}
