//! Database schema for the cache store
//!
//! All timestamps are INTEGER milliseconds since the Unix epoch (UTC).

use crate::Result;
use rusqlite::Connection;

pub(crate) const CACHE_TABLE: &str = "cache";
pub(crate) const LAYERS_TABLE: &str = "context_layers";
pub(crate) const SUMMARIES_TABLE: &str = "summaries";

/// Create tables and indexes if absent. Safe to run on every start.
pub(crate) fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS cache (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT UNIQUE NOT NULL,
            value TEXT NOT NULL,
            metadata TEXT,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            access_count INTEGER NOT NULL DEFAULT 0,
            last_accessed INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS context_layers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id TEXT NOT NULL,
            layer_type TEXT NOT NULL,
            content TEXT NOT NULL,
            metadata TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(document_id, layer_type)
        );

        CREATE TABLE IF NOT EXISTS summaries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id TEXT NOT NULL,
            summary_type TEXT NOT NULL,
            content TEXT NOT NULL,
            metadata TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(document_id, summary_type)
        );

        CREATE INDEX IF NOT EXISTS idx_cache_key ON cache(key);
        CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache(expires_at);
        CREATE INDEX IF NOT EXISTS idx_context_doc ON context_layers(document_id);
        CREATE INDEX IF NOT EXISTS idx_summary_doc ON summaries(document_id);
        "#,
    )?;

    Ok(())
}

/// Drop every table and recreate the schema. Test teardown only.
pub(crate) fn recreate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS cache;
        DROP TABLE IF EXISTS context_layers;
        DROP TABLE IF EXISTS summaries;
        "#,
    )?;
    init(conn)
}

/// Row count of one of the store's tables
pub(crate) fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;
    Ok(count as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        init(&conn).unwrap();

        assert_eq!(
            table_names(&conn),
            vec!["cache", "context_layers", "summaries"]
        );
    }

    #[test]
    fn test_indexes_created() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 4);
    }

    #[test]
    fn test_recreate_empties_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        conn.execute(
            "INSERT INTO summaries (document_id, summary_type, content, created_at, updated_at)
             VALUES ('d', 'full', 'x', 0, 0)",
            [],
        )
        .unwrap();
        assert_eq!(count_rows(&conn, SUMMARIES_TABLE).unwrap(), 1);

        recreate(&conn).unwrap();
        assert_eq!(count_rows(&conn, SUMMARIES_TABLE).unwrap(), 0);
        assert_eq!(count_rows(&conn, CACHE_TABLE).unwrap(), 0);
        assert_eq!(count_rows(&conn, LAYERS_TABLE).unwrap(), 0);
    }
}
