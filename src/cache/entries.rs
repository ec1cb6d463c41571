//! Key/value cache table
//!
//! Row-level operations on the `cache` table. Functions here take a
//! connection plus the current time in milliseconds and return errors; the
//! manager decides how failures degrade.

use super::clock::from_millis;
use crate::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

/// A cache row as stored
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Serialize a value for the `value` column.
///
/// Strings are stored raw unless the raw text would itself read back as a
/// different JSON value (`"42"`, `"true"`, `"[1]"`); those are stored as JSON
/// strings so reads return exactly what was written.
pub(crate) fn encode_value(value: &Value) -> Result<String> {
    match value {
        Value::String(s) if serde_json::from_str::<Value>(s).is_err() => Ok(s.clone()),
        other => Ok(serde_json::to_string(other)?),
    }
}

/// Parse a stored value, falling back to the raw string
pub(crate) fn decode_value(raw: String) -> Value {
    match serde_json::from_str::<Value>(&raw) {
        Ok(value) => value,
        Err(_) => Value::String(raw),
    }
}

/// `None` and JSON `null` are both stored as SQL NULL
pub(crate) fn encode_metadata(metadata: Option<&Value>) -> Result<Option<String>> {
    match metadata {
        None | Some(Value::Null) => Ok(None),
        Some(m) => Ok(Some(serde_json::to_string(m)?)),
    }
}

/// Insert or replace the row for `key`.
///
/// `created_at`, `expires_at` and `last_accessed` are reset; `access_count`
/// carries over from the replaced row.
pub(crate) fn upsert(
    conn: &Connection,
    key: &str,
    value: &str,
    metadata: Option<&str>,
    now: i64,
    expires_at: i64,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO cache (key, value, metadata, created_at, expires_at, access_count, last_accessed)
        VALUES (?1, ?2, ?3, ?4, ?5, 0, ?4)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            metadata = excluded.metadata,
            created_at = excluded.created_at,
            expires_at = excluded.expires_at,
            last_accessed = excluded.last_accessed
        "#,
        params![key, value, metadata, now, expires_at],
    )?;
    Ok(())
}

/// Outcome of a read that touches the row
#[derive(Debug, PartialEq)]
pub(crate) enum Lookup {
    Hit(String),
    Expired,
    Missing,
}

/// Read `key`, bumping its access statistics if live and deleting it if expired.
///
/// The bump is a single `UPDATE ... RETURNING`, so concurrent readers never
/// lose increments.
pub(crate) fn touch(conn: &Connection, key: &str, now: i64) -> Result<Lookup> {
    let value: Option<String> = conn
        .query_row(
            r#"
            UPDATE cache
            SET access_count = access_count + 1, last_accessed = ?2
            WHERE key = ?1 AND expires_at >= ?2
            RETURNING value
            "#,
            params![key, now],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(value) = value {
        return Ok(Lookup::Hit(value));
    }

    let removed = conn.execute(
        "DELETE FROM cache WHERE key = ?1 AND expires_at < ?2",
        params![key, now],
    )?;

    Ok(if removed > 0 {
        Lookup::Expired
    } else {
        Lookup::Missing
    })
}

/// Read a row without touching its statistics
pub(crate) fn peek(conn: &Connection, key: &str) -> Result<Option<CacheEntry>> {
    let row = conn
        .query_row(
            r#"
            SELECT key, value, metadata, created_at, expires_at, access_count, last_accessed
            FROM cache WHERE key = ?1
            "#,
            params![key],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((key, value, metadata, created_at, expires_at, access_count, last_accessed)) = row
    else {
        return Ok(None);
    };

    Ok(Some(CacheEntry {
        key,
        value: decode_value(value),
        metadata: metadata.map(decode_value),
        created_at: from_millis(created_at),
        expires_at: from_millis(expires_at),
        access_count: access_count.max(0) as u64,
        last_accessed: from_millis(last_accessed),
    }))
}

pub(crate) fn delete(conn: &Connection, key: &str) -> Result<usize> {
    Ok(conn.execute("DELETE FROM cache WHERE key = ?1", params![key])?)
}

/// Delete every row with `expires_at < now`
pub(crate) fn delete_expired(conn: &Connection, now: i64) -> Result<usize> {
    Ok(conn.execute("DELETE FROM cache WHERE expires_at < ?1", params![now])?)
}

pub(crate) fn count_expired(conn: &Connection, now: i64) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM cache WHERE expires_at < ?1",
        params![now],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

/// Keys of live rows, sorted
pub(crate) fn live_keys(conn: &Connection, now: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT key FROM cache WHERE expires_at >= ?1 ORDER BY key")?;
    let keys = stmt
        .query_map(params![now], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(keys)
}

/// Delete least-recently-accessed rows until at most `max_entries` remain
pub(crate) fn evict_lru(conn: &Connection, max_entries: usize) -> Result<usize> {
    let current: i64 = conn.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
    let current = current as usize;

    if current <= max_entries {
        return Ok(0);
    }

    let to_delete = current - max_entries;
    let deleted = conn.execute(
        r#"
        DELETE FROM cache WHERE id IN (
            SELECT id FROM cache
            ORDER BY last_accessed ASC, id ASC
            LIMIT ?1
        )
        "#,
        params![to_delete as i64],
    )?;

    Ok(deleted)
}
