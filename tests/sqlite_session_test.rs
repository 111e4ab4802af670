//! End-to-end tests against a SQLite file through the sqlx driver.
//!
//! Each test works on its own temporary database file, so writes from one
//! worker thread are visible to the others through the file.

use db_session::config::parse_url;
use db_session::db::{Connection, SessionManager, SqlxDriver};
use db_session::error::DbError;
use db_session::models::{DatabaseDescriptor, SettingTarget};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::NamedTempFile;

/// Helper to create a session pointed at a fresh SQLite file.
fn setup_session() -> (Arc<SessionManager>, NamedTempFile) {
    let temp_file = NamedTempFile::new().expect("Failed to create temp file");
    let url = format!("sqlite:{}", temp_file.path().display());

    let session = Arc::new(SessionManager::new(Arc::new(
        SqlxDriver::new().expect("Failed to start driver"),
    )));
    session
        .apply_parameters(parse_url(&url).expect("Failed to parse URL"))
        .expect("Failed to configure session");
    (session, temp_file)
}

#[test]
fn test_each_thread_writes_through_its_own_connection() {
    let (session, _temp_file) = setup_session();
    let main_conn = session.acquire().unwrap();
    main_conn
        .execute("CREATE TABLE visits (worker INTEGER NOT NULL)")
        .unwrap();

    let handles: Vec<_> = (0..3)
        .map(|worker| {
            let session = session.clone();
            std::thread::spawn(move || {
                let conn = session.acquire().unwrap();
                let rows = conn
                    .execute(&format!("INSERT INTO visits (worker) VALUES ({})", worker))
                    .unwrap();
                assert_eq!(rows, 1);
                conn.key()
            })
        })
        .collect();

    let mut keys: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    keys.push(main_conn.key());
    keys.sort_by_key(|k| k.to_string());
    keys.dedup();
    assert_eq!(keys.len(), 4);
    assert_eq!(session.connections().len(), 4);

    let deleted = main_conn.execute("DELETE FROM visits").unwrap();
    assert_eq!(deleted, 3);

    session.close_all_connections();
    assert!(session.is_empty());
    assert!(!main_conn.is_open());
}

#[test]
fn test_on_open_hook_configures_connection() {
    let (session, _temp_file) = setup_session();
    let hooks = Arc::new(AtomicUsize::new(0));
    let counter = hooks.clone();
    session.set_on_open(Some(Arc::new(move |conn: &Connection| {
        counter.fetch_add(1, Ordering::SeqCst);
        conn.execute("PRAGMA foreign_keys = ON").unwrap();
    })));

    let conn = session.acquire().unwrap();
    conn.execute("CREATE TABLE parent (id INTEGER PRIMARY KEY)").unwrap();
    conn.execute("CREATE TABLE child (parent_id INTEGER REFERENCES parent(id))")
        .unwrap();
    let err = conn
        .execute("INSERT INTO child (parent_id) VALUES (42)")
        .unwrap_err();
    assert!(err.message.to_lowercase().contains("foreign key"));
    assert_eq!(hooks.load(Ordering::SeqCst), 1);
}

#[test]
fn test_thread_database_override_opens_other_file() {
    let (session, _main_file) = setup_session();
    let other_file = NamedTempFile::new().unwrap();
    let other_path = other_file.path().to_string_lossy().to_string();

    let worker = {
        let session = session.clone();
        let other_path = other_path.clone();
        std::thread::spawn(move || {
            session
                .set_database_name(other_path, SettingTarget::current_thread())
                .unwrap();
            let conn = session.acquire().unwrap();
            conn.execute("CREATE TABLE only_here (id INTEGER)").unwrap();
            conn.descriptor().database_name.clone()
        })
    };
    assert_eq!(worker.join().unwrap(), other_path);

    let conn = session.acquire().unwrap();
    let err = conn.execute("INSERT INTO only_here (id) VALUES (1)").unwrap_err();
    assert!(err.message.contains("only_here"));
}

#[test]
fn test_database_scope_changes_parameters_for_next_connection() {
    let (session, _main_file) = setup_session();
    let archive_file = NamedTempFile::new().unwrap();
    let archive_path = archive_file.path().to_string_lossy().to_string();
    let archive = DatabaseDescriptor::new("QSQLITE", "", "archive");

    session
        .set_database_name(archive_path.clone(), SettingTarget::database(&archive))
        .unwrap();

    let scope = session.enter_database(&archive);
    assert!(scope.is_active());
    let detached = session.acquire_detached().unwrap();
    assert_eq!(detached.descriptor().database_name, archive_path);
    detached.close();
    drop(scope);

    assert!(session.is_empty());
    assert_ne!(session.database_name(), archive_path);
}

#[test]
fn test_missing_directory_reports_driver_error() {
    let (session, _temp_file) = setup_session();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("no/such/dir/app.db");
    session
        .set_database_name(missing.to_string_lossy(), SettingTarget::GLOBAL)
        .unwrap();

    let err = session.acquire().unwrap_err();
    assert!(matches!(err, DbError::Driver { .. }));
    assert!(err.suggestion().is_some());
    assert!(session.is_empty());
}

#[test]
fn test_sqlite_dialect_selected() {
    let (session, _temp_file) = setup_session();
    let generator = session.sql_generator();
    assert_eq!(generator.name(), "SQLite");
}
