//! Per-document content tables
//!
//! Context layers and summaries share one row shape, keyed by
//! `(document_id, <kind column>)`, but live in separate tables. A
//! [`ContentTable`] names one of them.

use super::clock::from_millis;
use super::entries::{decode_value, encode_metadata};
use super::schema::{LAYERS_TABLE, SUMMARIES_TABLE};
use crate::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Stored content of a context layer or summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredContent {
    pub content: String,
    /// Side payload; an empty object when none was saved
    pub metadata: Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContentTable {
    table: &'static str,
    kind_column: &'static str,
}

pub(crate) const CONTEXT_LAYERS: ContentTable = ContentTable {
    table: LAYERS_TABLE,
    kind_column: "layer_type",
};

pub(crate) const SUMMARIES: ContentTable = ContentTable {
    table: SUMMARIES_TABLE,
    kind_column: "summary_type",
};

impl ContentTable {
    pub(crate) fn name(&self) -> &'static str {
        self.table
    }

    /// Insert or overwrite `(document_id, kind)`, keeping the original `created_at`
    pub(crate) fn upsert(
        &self,
        conn: &Connection,
        document_id: &str,
        kind: &str,
        content: &str,
        metadata: Option<&Value>,
        now: i64,
    ) -> Result<()> {
        let metadata = encode_metadata(metadata)?;
        let sql = format!(
            r#"
            INSERT INTO {table} (document_id, {kind}, content, metadata, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(document_id, {kind}) DO UPDATE SET
                content = excluded.content,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
            "#,
            table = self.table,
            kind = self.kind_column,
        );
        conn.execute(&sql, params![document_id, kind, content, metadata, now])?;
        Ok(())
    }

    pub(crate) fn get(
        &self,
        conn: &Connection,
        document_id: &str,
        kind: &str,
    ) -> Result<Option<StoredContent>> {
        let sql = format!(
            "SELECT content, metadata, updated_at FROM {} WHERE document_id = ?1 AND {} = ?2",
            self.table, self.kind_column
        );
        let row = conn
            .query_row(&sql, params![document_id, kind], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .optional()?;

        Ok(row.map(|(content, metadata, updated_at)| to_stored(content, metadata, updated_at)))
    }

    /// Every row of a document, keyed by kind
    pub(crate) fn get_all(
        &self,
        conn: &Connection,
        document_id: &str,
    ) -> Result<BTreeMap<String, StoredContent>> {
        let sql = format!(
            "SELECT {}, content, metadata, updated_at FROM {} WHERE document_id = ?1",
            self.kind_column, self.table
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![document_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut all = BTreeMap::new();
        for row in rows {
            let (kind, content, metadata, updated_at) = row?;
            all.insert(kind, to_stored(content, metadata, updated_at));
        }
        Ok(all)
    }

    /// Remove every row of a document
    pub(crate) fn delete_document(&self, conn: &Connection, document_id: &str) -> Result<usize> {
        let sql = format!("DELETE FROM {} WHERE document_id = ?1", self.table);
        Ok(conn.execute(&sql, params![document_id])?)
    }

    /// `created_at` of a row, for tests and diagnostics
    #[cfg(test)]
    pub(crate) fn created_at(
        &self,
        conn: &Connection,
        document_id: &str,
        kind: &str,
    ) -> Result<Option<i64>> {
        let sql = format!(
            "SELECT created_at FROM {} WHERE document_id = ?1 AND {} = ?2",
            self.table, self.kind_column
        );
        Ok(conn
            .query_row(&sql, params![document_id, kind], |row| row.get(0))
            .optional()?)
    }
}

fn to_stored(content: String, metadata: Option<String>, updated_at: i64) -> StoredContent {
    StoredContent {
        content,
        metadata: metadata
            .map(decode_value)
            .unwrap_or_else(|| Value::Object(Map::new())),
        updated_at: from_millis(updated_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::schema;
    use serde_json::json;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::init(&conn).unwrap();
        conn
    }

    #[test]
    fn test_upsert_and_get() {
        let conn = conn();
        CONTEXT_LAYERS
            .upsert(&conn, "docA", "local", "x", Some(&json!({"chunk": 3})), 1_000)
            .unwrap();

        let layer = CONTEXT_LAYERS.get(&conn, "docA", "local").unwrap().unwrap();
        assert_eq!(layer.content, "x");
        assert_eq!(layer.metadata, json!({"chunk": 3}));
        assert_eq!(layer.updated_at.timestamp_millis(), 1_000);
    }

    #[test]
    fn test_missing_metadata_reads_as_empty_object() {
        let conn = conn();
        SUMMARIES.upsert(&conn, "doc", "full", "s", None, 0).unwrap();
        let summary = SUMMARIES.get(&conn, "doc", "full").unwrap().unwrap();
        assert_eq!(summary.metadata, json!({}));
    }

    #[test]
    fn test_upsert_keeps_created_at() {
        let conn = conn();
        CONTEXT_LAYERS.upsert(&conn, "d", "global", "v1", None, 1_000).unwrap();
        CONTEXT_LAYERS.upsert(&conn, "d", "global", "v2", None, 5_000).unwrap();

        let layer = CONTEXT_LAYERS.get(&conn, "d", "global").unwrap().unwrap();
        assert_eq!(layer.content, "v2");
        assert_eq!(layer.updated_at.timestamp_millis(), 5_000);
        assert_eq!(
            CONTEXT_LAYERS.created_at(&conn, "d", "global").unwrap(),
            Some(1_000)
        );
    }

    #[test]
    fn test_compound_key_isolation() {
        let conn = conn();
        CONTEXT_LAYERS.upsert(&conn, "docA", "local", "x", None, 0).unwrap();
        CONTEXT_LAYERS.upsert(&conn, "docA", "global", "y", None, 0).unwrap();
        CONTEXT_LAYERS.upsert(&conn, "docB", "local", "z", None, 0).unwrap();

        let all = CONTEXT_LAYERS.get_all(&conn, "docA").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["local"].content, "x");
        assert_eq!(all["global"].content, "y");
    }

    #[test]
    fn test_tables_are_separate_namespaces() {
        let conn = conn();
        CONTEXT_LAYERS.upsert(&conn, "doc", "full", "layer", None, 0).unwrap();
        SUMMARIES.upsert(&conn, "doc", "full", "summary", None, 0).unwrap();

        assert_eq!(CONTEXT_LAYERS.get(&conn, "doc", "full").unwrap().unwrap().content, "layer");
        assert_eq!(SUMMARIES.get(&conn, "doc", "full").unwrap().unwrap().content, "summary");
    }

    #[test]
    fn test_delete_document() {
        let conn = conn();
        SUMMARIES.upsert(&conn, "doc", "full", "a", None, 0).unwrap();
        SUMMARIES.upsert(&conn, "doc", "concise", "b", None, 0).unwrap();
        SUMMARIES.upsert(&conn, "other", "full", "c", None, 0).unwrap();

        assert_eq!(SUMMARIES.delete_document(&conn, "doc").unwrap(), 2);
        assert!(SUMMARIES.get(&conn, "doc", "full").unwrap().is_none());
        assert!(SUMMARIES.get(&conn, "other", "full").unwrap().is_some());
    }
}
