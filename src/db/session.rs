//! Database session manager.
//!
//! [`SessionManager`] owns one live connection per execution thread, opens it
//! lazily on first use, and resolves every connection parameter and behavior flag
//! through three tiers: per-database override, per-thread override, global default.
//!
//! # Locking
//!
//! One reentrant lock serializes every write (setters, generator assignment,
//! registry changes) and is held across the whole [`acquire`](SessionManager::acquire)
//! path including the connect call. The same thread may re-enter it, e.g. from a
//! post-open hook that reads settings or acquires again. Reads of the setting
//! tiers only take short shared locks.

use crate::db::dialect::{DialectSelector, GeneratorFactory, SqlGenerator};
use crate::db::driver::Driver;
use crate::db::registry::{Connection, ConnectionKey, ConnectionRegistry, ThreadToken};
use crate::db::settings::{SetOutcome, SettingResolver};
use crate::error::{DbError, DbResult, report_fault};
use crate::models::{
    BehaviorFlags, ConnectionParameters, ConnectionSummary, DatabaseDescriptor, DatabaseKey,
    PlaceholderStyle, Setting, SettingTarget, SettingType,
};
use parking_lot::{ReentrantMutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Callback run once with every newly opened, registered connection.
pub type OpenHook = Arc<dyn Fn(&Connection) + Send + Sync>;

/// Global defaults: the value used when no scoped override applies.
#[derive(Debug, Clone, Default)]
struct SessionDefaults {
    params: ConnectionParameters,
    flags: BehaviorFlags,
}

pub struct SessionManager {
    lock: ReentrantMutex<()>,
    defaults: RwLock<SessionDefaults>,
    settings: SettingResolver,
    dialects: DialectSelector,
    registry: ConnectionRegistry,
    driver: Arc<dyn Driver>,
    on_open: RwLock<Option<OpenHook>>,
}

impl SessionManager {
    /// Create a session manager opening connections through `driver`.
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self::with_dialects(driver, DialectSelector::new())
    }

    /// Create a session manager with a custom dialect table.
    pub fn with_generator_factory(driver: Arc<dyn Driver>, factory: GeneratorFactory) -> Self {
        Self::with_dialects(driver, DialectSelector::with_factory(factory))
    }

    fn with_dialects(driver: Arc<dyn Driver>, dialects: DialectSelector) -> Self {
        Self {
            lock: ReentrantMutex::new(()),
            defaults: RwLock::new(SessionDefaults::default()),
            settings: SettingResolver::new(),
            dialects,
            registry: ConnectionRegistry::new(),
            driver,
            on_open: RwLock::new(None),
        }
    }

    fn resolve<T: SettingType>(&self, setting: Setting) -> Option<T> {
        if self.settings.is_empty() {
            return None;
        }
        self.settings.get(setting).and_then(T::from_setting)
    }

    // ------------------------------------------------------------------
    // Connection parameters
    // ------------------------------------------------------------------

    /// Driver identifier, e.g. `QSQLITE`.
    pub fn driver_name(&self) -> String {
        self.resolve::<String>(Setting::DriverName)
            .unwrap_or_else(|| self.defaults.read().params.driver_name.clone())
    }

    /// Set the driver identifier.
    ///
    /// Also fills the dialect cache for the calling thread's scope.
    pub fn set_driver_name(
        &self,
        value: impl Into<String>,
        target: SettingTarget<'_>,
    ) -> DbResult<()> {
        let value: String = value.into();
        let _guard = self.lock.lock();
        let outcome = self.settings.set(
            Setting::DriverName,
            SettingType::into_setting(value.clone()),
            target,
        )?;
        if outcome == SetOutcome::UpdateGlobal {
            self.defaults.write().params.driver_name = value;
        }
        self.sql_generator();
        Ok(())
    }

    session_settings! {
        /// Driver-specific connect options (`key=value;key=value`).
        connect_options, set_connect_options: String = params.connect_options, Setting::ConnectOptions;
        /// Database name, or file path for SQLite.
        database_name, set_database_name: String = params.database_name, Setting::DatabaseName;
        /// Connection user name.
        user_name, set_user_name: String = params.user_name, Setting::UserName;
        /// Connection password.
        password, set_password: String = params.password, Setting::Password;
        /// Connection host name.
        host_name, set_host_name: String = params.host_name, Setting::HostName;
        /// Connection port; `None` uses the driver default.
        port, set_port: Option<u16> = params.port, Setting::Port;
    }

    // ------------------------------------------------------------------
    // Behavior flags
    // ------------------------------------------------------------------

    session_settings! {
        /// Trace each SQL query executed.
        trace_sql_query, set_trace_sql_query: bool = flags.trace_sql_query, Setting::TraceSqlQuery;
        /// Trace each SQL record fetched.
        trace_sql_record, set_trace_sql_record: bool = flags.trace_sql_record, Setting::TraceSqlRecord;
        /// Trace SQL bound values.
        trace_sql_bound_values, set_trace_sql_bound_values: bool = flags.trace_sql_bound_values, Setting::TraceSqlBoundValues;
        /// Trace SQL bound values, only when an error occurred.
        trace_sql_bound_values_on_error, set_trace_sql_bound_values_on_error: bool = flags.trace_sql_bound_values_on_error, Setting::TraceSqlBoundValuesOnError;
        /// Placeholder style used to build SQL.
        sql_placeholder_style, set_sql_placeholder_style: PlaceholderStyle = flags.sql_placeholder_style, Setting::SqlPlaceholderStyle;
        /// Raise an error as soon as a SQL error is appended to a session.
        session_throwable, set_session_throwable: bool = flags.session_throwable, Setting::SessionThrowable;
        /// Begin a transaction automatically when a session starts.
        session_auto_transaction, set_session_auto_transaction: bool = flags.session_auto_transaction, Setting::SessionAutoTransaction;
        /// Raise an error when invalid values are detected on insert or update.
        validator_throwable, set_validator_throwable: bool = flags.validator_throwable, Setting::ValidatorThrowable;
        /// Replace SQL aliases in queries automatically.
        auto_replace_sql_alias_into_query, set_auto_replace_sql_alias_into_query: bool = flags.auto_replace_sql_alias_into_query, Setting::AutoReplaceSqlAliasIntoQuery;
        /// Assert on invalid offsets while fetching relations.
        verify_offset_relation, set_verify_offset_relation: bool = flags.verify_offset_relation, Setting::VerifyOffsetRelation;
        /// Include the auto-increment id in UPDATE statements.
        add_auto_increment_id_to_update_query, set_add_auto_increment_id_to_update_query: bool = flags.add_auto_increment_id_to_update_query, Setting::AddAutoIncrementIdToUpdateQuery;
        /// Force the parent id on every child of a one-to-many relation.
        force_parent_id_to_all_children, set_force_parent_id_to_all_children: bool = flags.force_parent_id_to_all_children, Setting::ForceParentIdToAllChildren;
        /// Wrap table names in square brackets.
        add_sql_square_brackets_for_table_name, set_add_sql_square_brackets_for_table_name: bool = flags.add_sql_square_brackets_for_table_name, Setting::AddSqlSquareBracketsForTableName;
        /// Wrap column names in square brackets.
        add_sql_square_brackets_for_column_name, set_add_sql_square_brackets_for_column_name: bool = flags.add_sql_square_brackets_for_column_name, Setting::AddSqlSquareBracketsForColumnName;
        /// Pretty-print SQL before logging it.
        format_sql_query_before_logging, set_format_sql_query_before_logging: bool = flags.format_sql_query_before_logging, Setting::FormatSqlQueryBeforeLogging;
        /// Delimiters placed around table names, e.g. a backtick for MySQL.
        sql_delimiter_for_table_name, set_sql_delimiter_for_table_name: Vec<String> = flags.sql_delimiter_for_table_name, Setting::SqlDelimiterForTableName;
        /// Delimiters placed around column names.
        sql_delimiter_for_column_name, set_sql_delimiter_for_column_name: Vec<String> = flags.sql_delimiter_for_column_name, Setting::SqlDelimiterForColumnName;
        /// Trace only queries slower than this many milliseconds (database time).
        trace_sql_only_slow_queries_database, set_trace_sql_only_slow_queries_database: Option<u64> = flags.trace_sql_only_slow_queries_database, Setting::TraceSqlOnlySlowQueriesDatabase;
        /// Trace only queries slower than this many milliseconds (total time).
        trace_sql_only_slow_queries_total, set_trace_sql_only_slow_queries_total: Option<u64> = flags.trace_sql_only_slow_queries_total, Setting::TraceSqlOnlySlowQueriesTotal;
        /// Log every timer detail (prepare, exec, next, ...).
        display_timer_details, set_display_timer_details: bool = flags.display_timer_details, Setting::DisplayTimerDetails;
    }

    /// Effective connection parameters for the calling thread.
    pub fn connection_parameters(&self) -> ConnectionParameters {
        ConnectionParameters {
            driver_name: self.driver_name(),
            connect_options: self.connect_options(),
            database_name: self.database_name(),
            user_name: self.user_name(),
            password: self.password(),
            host_name: self.host_name(),
            port: self.port(),
        }
    }

    /// Effective behavior flags for the calling thread.
    pub fn behavior_flags(&self) -> BehaviorFlags {
        BehaviorFlags {
            trace_sql_query: self.trace_sql_query(),
            trace_sql_record: self.trace_sql_record(),
            trace_sql_bound_values: self.trace_sql_bound_values(),
            trace_sql_bound_values_on_error: self.trace_sql_bound_values_on_error(),
            sql_placeholder_style: self.sql_placeholder_style(),
            session_throwable: self.session_throwable(),
            session_auto_transaction: self.session_auto_transaction(),
            validator_throwable: self.validator_throwable(),
            auto_replace_sql_alias_into_query: self.auto_replace_sql_alias_into_query(),
            verify_offset_relation: self.verify_offset_relation(),
            add_auto_increment_id_to_update_query: self.add_auto_increment_id_to_update_query(),
            force_parent_id_to_all_children: self.force_parent_id_to_all_children(),
            add_sql_square_brackets_for_table_name: self.add_sql_square_brackets_for_table_name(),
            add_sql_square_brackets_for_column_name: self
                .add_sql_square_brackets_for_column_name(),
            format_sql_query_before_logging: self.format_sql_query_before_logging(),
            sql_delimiter_for_table_name: self.sql_delimiter_for_table_name(),
            sql_delimiter_for_column_name: self.sql_delimiter_for_column_name(),
            trace_sql_only_slow_queries_database: self.trace_sql_only_slow_queries_database(),
            trace_sql_only_slow_queries_total: self.trace_sql_only_slow_queries_total(),
            display_timer_details: self.display_timer_details(),
        }
    }

    /// Set every connection parameter globally.
    pub fn apply_parameters(&self, params: ConnectionParameters) -> DbResult<()> {
        let _guard = self.lock.lock();
        self.set_connect_options(params.connect_options, SettingTarget::GLOBAL)?;
        self.set_database_name(params.database_name, SettingTarget::GLOBAL)?;
        self.set_user_name(params.user_name, SettingTarget::GLOBAL)?;
        self.set_password(params.password, SettingTarget::GLOBAL)?;
        self.set_host_name(params.host_name, SettingTarget::GLOBAL)?;
        self.set_port(params.port, SettingTarget::GLOBAL)?;
        self.set_driver_name(params.driver_name, SettingTarget::GLOBAL)
    }

    /// Install the callback run with each newly opened connection (global only).
    pub fn set_on_open(&self, hook: Option<OpenHook>) {
        let _guard = self.lock.lock();
        *self.on_open.write() = hook;
    }

    // ------------------------------------------------------------------
    // Dialect
    // ------------------------------------------------------------------

    /// SQL generator for the calling thread.
    ///
    /// Scope order: current database, current thread, global. With none cached the
    /// global one is selected from the global driver name and initialized once.
    pub fn sql_generator(&self) -> Arc<dyn SqlGenerator> {
        let thread = ThreadToken::current().ok();
        let database = thread.and_then(|t| self.settings.current_database_for(t));
        if let Some(generator) = self.dialects.cached(thread, database.as_ref()) {
            return generator;
        }
        let _guard = self.lock.lock();
        let driver_name = self.defaults.read().params.driver_name.clone();
        self.dialects.select_global(&driver_name)
    }

    /// Replace the SQL generator for the scopes named by `target`.
    ///
    /// A new generator is initialized right away; `None` removes the scope's generator.
    pub fn set_sql_generator(
        &self,
        generator: Option<Arc<dyn SqlGenerator>>,
        target: SettingTarget<'_>,
    ) -> DbResult<()> {
        let _guard = self.lock.lock();
        let database_key = match target.database {
            Some(descriptor) => Some(SettingResolver::database_key(descriptor, "SqlGenerator")?),
            None => None,
        };
        if target.current_thread {
            let thread = ThreadToken::current().inspect_err(report_fault)?;
            self.dialects.set_for_thread(thread, generator.clone());
        }
        if let Some(key) = database_key {
            self.dialects.set_for_database(key, generator.clone());
        }
        if target.is_global() {
            self.dialects.set_global(generator.clone());
        }
        if let Some(generator) = generator {
            debug!(dialect = generator.name(), "Installing SQL dialect");
            generator.init();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Connection of the calling thread, opened on first use.
    ///
    /// Returns the registered connection while it is still open; otherwise opens a
    /// new one with a fresh key, registers it for this thread, runs the post-open
    /// hook once and returns it. A failed open registers nothing.
    pub fn acquire(&self) -> DbResult<Connection> {
        let _guard = self.lock.lock();
        let params = self.connection_parameters();
        Self::validate(&params)?;
        let thread = ThreadToken::current().inspect_err(report_fault)?;

        if let Some(conn) = self.registry.live(thread) {
            return Ok(conn);
        }

        let conn = self.open(thread, &params)?;
        if let Some(stale) = self.registry.insert(thread, conn.clone()) {
            debug!(thread = %thread, key = %stale.key(), "Replacing stale connection");
            stale.close();
        }
        info!(
            thread = %thread,
            key = %conn.key(),
            driver = %params.driver_name,
            database = %params.database_name,
            "Created new database connection"
        );

        let hook = self.on_open.read().clone();
        if let Some(hook) = hook {
            hook(&conn);
        }
        Ok(conn)
    }

    /// Open a standalone connection with the effective parameters.
    ///
    /// The connection is not registered and the post-open hook is not run; the
    /// caller owns it and closes it.
    pub fn acquire_detached(&self) -> DbResult<Connection> {
        let params = self.connection_parameters();
        Self::validate(&params)?;
        let thread = ThreadToken::current().inspect_err(report_fault)?;
        let conn = self.open(thread, &params)?;
        debug!(thread = %thread, key = %conn.key(), "Opened detached connection");
        Ok(conn)
    }

    /// Registered, still-open connection of the calling thread, without opening one.
    pub fn current_connection(&self) -> Option<Connection> {
        let _guard = self.lock.lock();
        let thread = ThreadToken::current().ok()?;
        self.registry.live(thread)
    }

    fn validate(params: &ConnectionParameters) -> DbResult<()> {
        if params.is_valid() {
            return Ok(());
        }
        let missing = if params.driver_name.is_empty() {
            "driver name is empty"
        } else {
            "database name is empty"
        };
        let err = DbError::invalid_parameters(missing);
        report_fault(&err);
        Err(err)
    }

    fn open(&self, thread: ThreadToken, params: &ConnectionParameters) -> DbResult<Connection> {
        let key = ConnectionKey::new();
        match self.driver.open(params) {
            Ok(raw) => Ok(Connection::new(key, thread, params.descriptor(), raw)),
            Err(driver_err) => {
                warn!(
                    thread = %thread,
                    key = %key,
                    driver = %params.driver_name,
                    database = %params.database_name,
                    error = %driver_err,
                    "Unable to open connection to database"
                );
                Err(driver_err.into_open_error(params))
            }
        }
    }

    /// Summaries of every registered connection.
    pub fn connections(&self) -> Vec<ConnectionSummary> {
        self.registry.summaries()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Close and unregister every connection, then release the driver's pools.
    pub fn close_all_connections(&self) {
        let _guard = self.lock.lock();
        let closed = self.registry.close_all();
        self.driver.clear_pools();
        info!(count = closed, "All connections closed");
    }

    /// Close every connection and reset all connection parameters to empty.
    pub fn clear_all(&self) {
        let _guard = self.lock.lock();
        self.close_all_connections();
        self.defaults.write().params = ConnectionParameters::default();
    }

    /// True when no thread has a registered connection.
    pub fn is_empty(&self) -> bool {
        let _guard = self.lock.lock();
        self.registry.is_empty()
    }

    /// Mark `descriptor` as the calling thread's current database.
    ///
    /// Returns false (and installs nothing) when the descriptor matches the global
    /// default database, has an empty key, or the thread already has a marker.
    pub fn mark_current_database(&self, descriptor: &DatabaseDescriptor) -> bool {
        let key = descriptor.key();
        if key == self.default_database_key() {
            return false;
        }
        let _guard = self.lock.lock();
        let Ok(thread) = ThreadToken::current() else {
            return false;
        };
        self.settings.mark_current_database(thread, key)
    }

    /// Remove the calling thread's current database marker.
    pub fn clear_current_database(&self) {
        let _guard = self.lock.lock();
        if let Ok(thread) = ThreadToken::current() {
            self.settings.clear_current_database(thread);
        }
    }

    /// Current database marker of the calling thread.
    pub fn current_database(&self) -> Option<DatabaseKey> {
        let thread = ThreadToken::current().ok()?;
        self.settings.current_database_for(thread)
    }

    /// Mark `descriptor` as current for the lifetime of the returned guard.
    ///
    /// The guard clears the marker of the thread that entered the scope, even
    /// when it is dropped on another thread.
    pub fn enter_database(&self, descriptor: &DatabaseDescriptor) -> DatabaseScope<'_> {
        let owner = if self.mark_current_database(descriptor) {
            ThreadToken::current().ok()
        } else {
            None
        };
        DatabaseScope {
            session: self,
            owner,
        }
    }

    /// Drop every thread override and the thread generator of the calling thread.
    pub fn clear_settings_for_current_thread(&self) {
        let _guard = self.lock.lock();
        if let Ok(thread) = ThreadToken::current() {
            self.settings.clear_thread(thread);
            self.dialects.set_for_thread(thread, None);
        }
    }

    /// Drop every override and the generator registered for `descriptor`.
    pub fn clear_settings_for_database(&self, descriptor: &DatabaseDescriptor) {
        let _guard = self.lock.lock();
        let key = descriptor.key();
        self.settings.clear_database(&key);
        self.dialects.set_for_database(key, None);
    }

    fn default_database_key(&self) -> DatabaseKey {
        self.defaults.read().params.descriptor().key()
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("defaults", &*self.defaults.read())
            .field("connections", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// RAII guard bracketing one unit of work on a specific database.
///
/// Clears the thread's current database marker on drop, but only if this guard
/// installed it.
#[must_use = "the database marker is cleared when the guard is dropped"]
pub struct DatabaseScope<'a> {
    session: &'a SessionManager,
    /// Thread whose marker this guard installed.
    owner: Option<ThreadToken>,
}

impl DatabaseScope<'_> {
    /// Whether this guard installed the marker.
    pub fn is_active(&self) -> bool {
        self.owner.is_some()
    }
}

impl std::fmt::Debug for DatabaseScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseScope")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

impl Drop for DatabaseScope<'_> {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.take() {
            let _guard = self.session.lock.lock();
            self.session.settings.clear_current_database(owner);
        }
    }
}
