//! SQL dialect generators and their per-scope selection.
//!
//! A generator is a strategy object building the SQL text for one database
//! family. The selector caches one instance per scope: per database, per thread
//! and global, falling back to a choice by driver name.

use crate::db::registry::ThreadToken;
use crate::models::{DatabaseKey, DatabaseType, PlaceholderStyle};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Capability interface of a SQL dialect.
pub trait SqlGenerator: Send + Sync {
    /// Name of the dialect, e.g. "MySQL".
    fn name(&self) -> &'static str;

    /// One-time setup, run when the generator is installed for a scope.
    fn init(&self) {}

    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn placeholder(&self, column: &str, style: PlaceholderStyle) -> String {
        match style {
            PlaceholderStyle::QuestionMark => "?".to_string(),
            PlaceholderStyle::TwoPointName => format!(":{}", column),
            PlaceholderStyle::AtName => format!("@{}", column),
        }
    }

    /// Clause appended to a select to cap the row count.
    fn limit_clause(&self, limit: u64) -> String {
        format!(" LIMIT {}", limit)
    }

    fn build_insert(&self, table: &str, columns: &[&str], style: PlaceholderStyle) -> String {
        let names: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
        let values: Vec<String> = columns.iter().map(|c| self.placeholder(c, style)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote_identifier(table),
            names.join(", "),
            values.join(", ")
        )
    }

    fn build_update(
        &self,
        table: &str,
        columns: &[&str],
        id_column: &str,
        style: PlaceholderStyle,
    ) -> String {
        let sets: Vec<String> = columns
            .iter()
            .map(|c| format!("{} = {}", self.quote_identifier(c), self.placeholder(c, style)))
            .collect();
        format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.quote_identifier(table),
            sets.join(", "),
            self.quote_identifier(id_column),
            self.placeholder(id_column, style)
        )
    }

    fn build_select(&self, table: &str, columns: &[&str], limit: Option<u64>) -> String {
        let list = if columns.is_empty() {
            "*".to_string()
        } else {
            columns
                .iter()
                .map(|c| self.quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", list, self.quote_identifier(table));
        if let Some(limit) = limit {
            sql.push_str(&self.limit_clause(limit));
        }
        sql
    }

    fn build_delete(&self, table: &str, id_column: &str, style: PlaceholderStyle) -> String {
        format!(
            "DELETE FROM {} WHERE {} = {}",
            self.quote_identifier(table),
            self.quote_identifier(id_column),
            self.placeholder(id_column, style)
        )
    }
}

/// ANSI SQL, used when the driver name is not recognised.
#[derive(Debug, Default)]
pub struct StandardGenerator;

impl SqlGenerator for StandardGenerator {
    fn name(&self) -> &'static str {
        "Standard"
    }

    fn init(&self) {
        debug!(dialect = self.name(), "Dialect initialized");
    }
}

#[derive(Debug, Default)]
pub struct MySqlGenerator;

impl SqlGenerator for MySqlGenerator {
    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn init(&self) {
        debug!(dialect = self.name(), "Dialect initialized");
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }
}

#[derive(Debug, Default)]
pub struct PostgresGenerator;

impl SqlGenerator for PostgresGenerator {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn init(&self) {
        debug!(dialect = self.name(), "Dialect initialized");
    }
}

#[derive(Debug, Default)]
pub struct SqliteGenerator;

impl SqlGenerator for SqliteGenerator {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    fn init(&self) {
        debug!(dialect = self.name(), "Dialect initialized");
    }
}

#[derive(Debug, Default)]
pub struct OracleGenerator;

impl SqlGenerator for OracleGenerator {
    fn name(&self) -> &'static str {
        "Oracle"
    }

    fn init(&self) {
        debug!(dialect = self.name(), "Dialect initialized");
    }

    fn limit_clause(&self, limit: u64) -> String {
        format!(" FETCH FIRST {} ROWS ONLY", limit)
    }
}

/// Builds the generator used when no scope has one, given the global driver name.
pub type GeneratorFactory = Arc<dyn Fn(&str) -> Arc<dyn SqlGenerator> + Send + Sync>;

/// Built-in driver table: exact driver-name match, Standard otherwise.
pub fn builtin_generator(driver_name: &str) -> Arc<dyn SqlGenerator> {
    match DatabaseType::from_driver_name(driver_name) {
        Some(DatabaseType::MySQL) => Arc::new(MySqlGenerator),
        Some(DatabaseType::PostgreSQL) => Arc::new(PostgresGenerator),
        Some(DatabaseType::SQLite) => Arc::new(SqliteGenerator),
        Some(DatabaseType::Oracle) => Arc::new(OracleGenerator),
        None => Arc::new(StandardGenerator),
    }
}

/// Per-scope generator caches.
pub struct DialectSelector {
    global: RwLock<Option<Arc<dyn SqlGenerator>>>,
    by_thread: RwLock<HashMap<ThreadToken, Arc<dyn SqlGenerator>>>,
    by_database: RwLock<HashMap<DatabaseKey, Arc<dyn SqlGenerator>>>,
    factory: GeneratorFactory,
}

impl DialectSelector {
    pub fn new() -> Self {
        Self::with_factory(Arc::new(builtin_generator))
    }

    pub fn with_factory(factory: GeneratorFactory) -> Self {
        Self {
            global: RwLock::new(None),
            by_thread: RwLock::new(HashMap::new()),
            by_database: RwLock::new(HashMap::new()),
            factory,
        }
    }

    /// Generator cached for a scope (database, then thread, then global), if any.
    pub fn cached(
        &self,
        thread: Option<ThreadToken>,
        database: Option<&DatabaseKey>,
    ) -> Option<Arc<dyn SqlGenerator>> {
        if let Some(key) = database {
            let by_database = self.by_database.read();
            if let Some(generator) = by_database.get(key) {
                return Some(Arc::clone(generator));
            }
        }
        if let Some(thread) = thread {
            let by_thread = self.by_thread.read();
            if let Some(generator) = by_thread.get(&thread) {
                return Some(Arc::clone(generator));
            }
        }
        self.global.read().clone()
    }

    /// Select the global generator from `driver_name` and run its `init()`.
    ///
    /// Callers hold the session lock, so at most one selection happens per global slot.
    pub fn select_global(&self, driver_name: &str) -> Arc<dyn SqlGenerator> {
        if let Some(generator) = self.global.read().clone() {
            return generator;
        }
        let generator = (self.factory)(driver_name);
        *self.global.write() = Some(Arc::clone(&generator));
        debug!(driver = %driver_name, dialect = generator.name(), "Selected SQL dialect");
        generator.init();
        generator
    }

    /// Install (or with `None`, remove) the global generator.
    pub fn set_global(&self, generator: Option<Arc<dyn SqlGenerator>>) {
        *self.global.write() = generator;
    }

    pub fn set_for_thread(&self, thread: ThreadToken, generator: Option<Arc<dyn SqlGenerator>>) {
        let mut by_thread = self.by_thread.write();
        match generator {
            Some(generator) => {
                by_thread.insert(thread, generator);
            }
            None => {
                by_thread.remove(&thread);
            }
        }
    }

    pub fn set_for_database(&self, key: DatabaseKey, generator: Option<Arc<dyn SqlGenerator>>) {
        let mut by_database = self.by_database.write();
        match generator {
            Some(generator) => {
                by_database.insert(key, generator);
            }
            None => {
                by_database.remove(&key);
            }
        }
    }
}

impl Default for DialectSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_builtin_table() {
        assert_eq!(builtin_generator("QMYSQL").name(), "MySQL");
        assert_eq!(builtin_generator("QPSQL").name(), "PostgreSQL");
        assert_eq!(builtin_generator("QSQLITE").name(), "SQLite");
        assert_eq!(builtin_generator("QOCI").name(), "Oracle");
        assert_eq!(builtin_generator("QODBC").name(), "Standard");
        assert_eq!(builtin_generator("").name(), "Standard");
    }

    #[test]
    fn test_mysql_quoting() {
        let generator = MySqlGenerator;
        assert_eq!(generator.quote_identifier("order"), "`order`");
        assert_eq!(generator.quote_identifier("a`b"), "`a``b`");
        assert_eq!(StandardGenerator.quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_build_statements() {
        let generator = SqliteGenerator;
        assert_eq!(
            generator.build_insert("users", &["id", "name"], PlaceholderStyle::TwoPointName),
            "INSERT INTO \"users\" (\"id\", \"name\") VALUES (:id, :name)"
        );
        assert_eq!(
            generator.build_update("users", &["name"], "id", PlaceholderStyle::QuestionMark),
            "UPDATE \"users\" SET \"name\" = ? WHERE \"id\" = ?"
        );
        assert_eq!(
            generator.build_delete("users", "id", PlaceholderStyle::AtName),
            "DELETE FROM \"users\" WHERE \"id\" = @id"
        );
        assert_eq!(
            generator.build_select("users", &[], Some(10)),
            "SELECT * FROM \"users\" LIMIT 10"
        );
    }

    #[test]
    fn test_oracle_limit() {
        assert_eq!(
            OracleGenerator.build_select("t", &["a"], Some(5)),
            "SELECT \"a\" FROM \"t\" FETCH FIRST 5 ROWS ONLY"
        );
    }

    struct Counting(AtomicUsize);

    impl SqlGenerator for Counting {
        fn name(&self) -> &'static str {
            "Counting"
        }

        fn init(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_select_global_caches_and_inits_once() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        let shared = Arc::new(Counting(AtomicUsize::new(0)));
        let instance = shared.clone();
        let selector = DialectSelector::with_factory(Arc::new(move |_: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            instance.clone() as Arc<dyn SqlGenerator>
        }));

        let first = selector.select_global("QMYSQL");
        let second = selector.select_global("QMYSQL");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(shared.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cached_scope_order() {
        let selector = DialectSelector::new();
        let thread = ThreadToken::current().unwrap();
        let key = DatabaseKey::new("QOCI", "", "erp");
        assert!(selector.cached(Some(thread), Some(&key)).is_none());

        selector.set_global(Some(Arc::new(StandardGenerator)));
        assert_eq!(selector.cached(Some(thread), Some(&key)).unwrap().name(), "Standard");

        selector.set_for_thread(thread, Some(Arc::new(SqliteGenerator)));
        assert_eq!(selector.cached(Some(thread), Some(&key)).unwrap().name(), "SQLite");

        selector.set_for_database(key.clone(), Some(Arc::new(OracleGenerator)));
        assert_eq!(selector.cached(Some(thread), Some(&key)).unwrap().name(), "Oracle");
        assert_eq!(selector.cached(Some(thread), None).unwrap().name(), "SQLite");

        selector.set_for_database(key.clone(), None);
        selector.set_for_thread(thread, None);
        assert_eq!(selector.cached(Some(thread), Some(&key)).unwrap().name(), "Standard");
    }
}
