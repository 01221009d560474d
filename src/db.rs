use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{Connection, OpenFlags};
use tracing::info;

use crate::errors::{AppError, AppResult};

pub struct DatabaseContext {
    pub connection: Connection,
    pub path: Option<PathBuf>,
}

pub fn bootstrap<P: AsRef<Path>>(data_dir: P, database_file: &str) -> AppResult<DatabaseContext> {
    let data_dir = data_dir.as_ref();
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join(database_file);

    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let connection = Connection::open_with_flags(&db_path, flags)?;
    configure(&connection, true)?;
    run_migrations(&connection)?;

    info!(
        target: "database_bootstrap",
        path = %db_path.display(),
        "SQLite context established"
    );
    Ok(DatabaseContext {
        connection,
        path: Some(db_path),
    })
}

pub fn open_in_memory() -> AppResult<DatabaseContext> {
    let connection = Connection::open_in_memory()?;
    configure(&connection, false)?;
    run_migrations(&connection)?;
    Ok(DatabaseContext {
        connection,
        path: None,
    })
}

fn configure(connection: &Connection, write_ahead_log: bool) -> AppResult<()> {
    if write_ahead_log {
        connection.execute_batch("PRAGMA journal_mode = WAL;")?;
    }
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(())
}

fn run_migrations(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS restaurants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT '',
            address TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT '',
            longitude REAL NOT NULL DEFAULT 0,
            latitude REAL NOT NULL DEFAULT 0,
            region TEXT NOT NULL,
            place_url TEXT NOT NULL DEFAULT '',
            image_url TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_restaurants_name_address ON restaurants(name, address);
        CREATE INDEX IF NOT EXISTS idx_restaurants_region ON restaurants(region);
        "#,
    )?;

    ensure_column(
        connection,
        "restaurants",
        "created_at TEXT NOT NULL DEFAULT ''",
    )?;
    Ok(())
}

fn ensure_column(connection: &Connection, table: &str, definition: &str) -> AppResult<()> {
    let column_name = definition
        .split_whitespace()
        .next()
        .ok_or_else(|| AppError::Config(format!("invalid column definition: {definition}")))?;
    if column_exists(connection, table, column_name)? {
        return Ok(());
    }
    let sql = format!("ALTER TABLE {table} ADD COLUMN {definition}");
    connection.execute(&sql, [])?;
    Ok(())
}

fn column_exists(connection: &Connection, table: &str, column: &str) -> AppResult<bool> {
    let pragma = format!("PRAGMA table_info({table})");
    let mut stmt = connection.prepare(&pragma)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn runs_migrations_and_creates_tables() {
        let dir = tempdir().unwrap();
        let ctx = bootstrap(dir.path(), "test.db").unwrap();

        let tables: i64 = ctx
            .connection
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = 'restaurants'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
        assert!(column_exists(&ctx.connection, "restaurants", "created_at").unwrap());
        assert!(ctx.path.unwrap().ends_with("test.db"));
    }

    #[test]
    fn migrations_are_idempotent() {
        let dir = tempdir().unwrap();
        drop(bootstrap(dir.path(), "again.db").unwrap());
        let ctx = bootstrap(dir.path(), "again.db").unwrap();
        run_migrations(&ctx.connection).unwrap();
    }

    #[test]
    fn in_memory_database_has_schema() {
        let ctx = open_in_memory().unwrap();
        assert!(ctx.path.is_none());
        assert!(column_exists(&ctx.connection, "restaurants", "image_url").unwrap());
    }
}
