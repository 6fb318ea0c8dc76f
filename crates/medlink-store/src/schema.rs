//! Database schema.
//!
//! The version lives in SQLite's `user_version` pragma; 0 means a database
//! nothing has been written to yet.

use rusqlite::Connection;

use crate::error::{Error, Result};

/// Schema version written by this build.
pub const SCHEMA_VERSION: i32 = 1;

const CREATE_KV: &str = "
    CREATE TABLE IF NOT EXISTS kv (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );
";

/// Create the tables on a fresh database and refuse one written by a newer
/// build.
pub fn initialize(conn: &Connection) -> Result<()> {
    match get_schema_version(conn)? {
        0 => {
            conn.execute_batch(CREATE_KV)?;
            set_schema_version(conn, SCHEMA_VERSION)
        }
        found if found > SCHEMA_VERSION => Err(Error::UnsupportedSchema {
            found,
            supported: SCHEMA_VERSION,
        }),
        _ => Ok(()),
    }
}

pub(crate) fn get_schema_version(conn: &Connection) -> Result<i32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

pub(crate) fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_fresh_database_gets_kv_table() {
        let conn = memory();
        assert_eq!(get_schema_version(&conn).unwrap(), 0);
        initialize(&conn).unwrap();

        let columns: Vec<String> = conn
            .prepare("SELECT name FROM pragma_table_info('kv')")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|name| name.unwrap())
            .collect();
        assert_eq!(columns, ["key", "value", "updated_at"]);
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_initialize_twice_keeps_rows() {
        let conn = memory();
        initialize(&conn).unwrap();
        conn.execute("INSERT INTO kv VALUES ('a', '1', 0)", []).unwrap();

        initialize(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let conn = memory();
        initialize(&conn).unwrap();
        set_schema_version(&conn, SCHEMA_VERSION + 1).unwrap();

        let err = initialize(&conn).unwrap_err();
        assert!(matches!(err, Error::UnsupportedSchema { found: 2, .. }));
    }
}
