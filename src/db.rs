//! Local SQLite database layer for BoliBana Stock.
//!
//! Uses rusqlite with WAL mode. Holds the `local_settings` key/value table
//! (configuration overrides) and the `drafts` table (in-progress working
//! lists), with schema migrations applied on open.

use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Shared handle to the database connection.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

const DB_FILE_NAME: &str = "bolibana.db";

/// Initialize the database at `{data_dir}/bolibana.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure,
/// deletes the file and retries once.
pub fn init(data_dir: &Path) -> Result<DbState, String> {
    fs::create_dir_all(data_dir).map_err(|e| format!("Failed to create data dir: {e}"))?;

    let db_path = data_dir.join(DB_FILE_NAME);
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
            }
            open_and_configure(&db_path)
                .map_err(|e| format!("Database open failed after retry: {e}"))?
        }
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, String> {
    let conn = Connection::open(path).map_err(|e| format!("sqlite open: {e}"))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| format!("pragma setup: {e}"))?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("create schema_version: {e}"))?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Migration v1: settings store.
fn migrate_v1(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| format!("migrate_v1: {e}"))
}

/// Migration v2: working-list drafts, one row per draft kind.
fn migrate_v2(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS drafts (
            draft_key TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            item_count INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT DEFAULT (datetime('now'))
        );

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| format!("migrate_v2: {e}"))
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Insert or update a setting.
pub fn set_setting(
    conn: &Connection,
    category: &str,
    key: &str,
    value: &str,
) -> Result<(), String> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )
    .map_err(|e| format!("set_setting: {e}"))?;
    Ok(())
}

/// All settings of one category as `(key, value)` pairs.
pub fn get_category_settings(conn: &Connection, category: &str) -> Vec<(String, String)> {
    let mut stmt = match conn.prepare(
        "SELECT setting_key, setting_value FROM local_settings
         WHERE setting_category = ?1 ORDER BY setting_key",
    ) {
        Ok(s) => s,
        Err(e) => {
            error!("get_category_settings prepare: {e}");
            return Vec::new();
        }
    };
    let rows = match stmt.query_map(params![category], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    }) {
        Ok(r) => r,
        Err(e) => {
            error!("get_category_settings query: {e}");
            return Vec::new();
        }
    };
    rows.flatten().collect()
}

/// Delete all settings in a category.
pub fn delete_all_settings(conn: &Connection, category: &str) -> Result<(), String> {
    conn.execute(
        "DELETE FROM local_settings WHERE setting_category = ?1",
        params![category],
    )
    .map_err(|e| format!("delete_all_settings: {e}"))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Draft rows
// ---------------------------------------------------------------------------

pub fn read_draft(conn: &Connection, key: &str) -> Result<Option<String>, String> {
    match conn.query_row(
        "SELECT payload FROM drafts WHERE draft_key = ?1",
        params![key],
        |row| row.get::<_, String>(0),
    ) {
        Ok(payload) => Ok(Some(payload)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(format!("read_draft: {e}")),
    }
}

pub fn write_draft(
    conn: &Connection,
    key: &str,
    payload: &str,
    item_count: usize,
) -> Result<(), String> {
    conn.execute(
        "INSERT INTO drafts (draft_key, payload, item_count, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(draft_key) DO UPDATE SET
            payload = excluded.payload,
            item_count = excluded.item_count,
            updated_at = excluded.updated_at",
        params![key, payload, item_count as i64],
    )
    .map_err(|e| format!("write_draft: {e}"))?;
    Ok(())
}

pub fn delete_draft(conn: &Connection, key: &str) -> Result<(), String> {
    conn.execute("DELETE FROM drafts WHERE draft_key = ?1", params![key])
        .map_err(|e| format!("delete_draft: {e}"))?;
    Ok(())
}

/// In-memory database with migrations applied (test helper, not public API).
#[cfg(test)]
pub(crate) fn test_state() -> DbState {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    run_migrations(&conn).expect("run_migrations should succeed in test");
    DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare table list");
        stmt.query_map([], |row| row.get(0))
            .expect("query tables")
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_migrations_to_latest() {
        let conn = Connection::open_in_memory().expect("open");
        run_migrations(&conn).expect("migrations");
        let tables = table_names(&conn);
        for t in ["schema_version", "local_settings", "drafts"] {
            assert!(tables.contains(&t.to_string()), "missing table {t}");
        }
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .expect("version");
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().expect("open");
        run_migrations(&conn).expect("first run");
        run_migrations(&conn).expect("second run");
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .expect("count");
        assert_eq!(rows, CURRENT_SCHEMA_VERSION as i64);
    }

    #[test]
    fn test_init_creates_wal_file_db() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = init(dir.path()).expect("init");
        assert!(state.db_path.ends_with(DB_FILE_NAME));
        let conn = state.conn.lock().expect("lock");
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |r| r.get(0))
            .expect("journal_mode");
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_settings_crud() {
        let state = test_state();
        let conn = state.conn.lock().unwrap();

        set_setting(&conn, "app", "search_page_size", "20").expect("set");
        assert_eq!(
            get_category_settings(&conn, "app"),
            vec![("search_page_size".to_string(), "20".to_string())]
        );

        set_setting(&conn, "app", "search_page_size", "50").expect("update");
        set_setting(&conn, "app", "api_base_url", "https://x").expect("set");
        let all = get_category_settings(&conn, "app");
        assert_eq!(all.len(), 2);
        assert_eq!(all[1], ("search_page_size".to_string(), "50".to_string()));

        set_setting(&conn, "other", "kept", "1").expect("set");
        delete_all_settings(&conn, "app").expect("delete");
        assert!(get_category_settings(&conn, "app").is_empty());
        assert_eq!(get_category_settings(&conn, "other").len(), 1);
    }

    #[test]
    fn test_draft_rows_upsert_and_delete() {
        let state = test_state();
        let conn = state.conn.lock().unwrap();
        assert_eq!(read_draft(&conn, "loss").unwrap(), None);
        write_draft(&conn, "loss", "[]", 0).unwrap();
        write_draft(&conn, "loss", "[1]", 1).unwrap();
        assert_eq!(read_draft(&conn, "loss").unwrap().as_deref(), Some("[1]"));
        delete_draft(&conn, "loss").unwrap();
        delete_draft(&conn, "loss").unwrap();
        assert_eq!(read_draft(&conn, "loss").unwrap(), None);
    }
}
