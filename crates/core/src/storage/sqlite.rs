//! SQLite storage adapter.
//!
//! Three tables mirror the data model: `resources` holds each resource's
//! current version, `resource_history` is the append-only version log, and
//! `search_index` holds the live secondary index entries. One logical write
//! (version + index replacement) is one SQLite transaction.
//!
//! The core is a single-logical-worker component, so the connection sits
//! behind a mutex rather than a pool.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use crate::error::{ServerError, ServerResult};
use crate::types::{Comparator, IndexEntry, IndexFilter, IndexedValue, InteractionMethod, VersionRecord};

use super::{instant_matches, Storage};

/// A [`Storage`] adapter backed by a SQLite database.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens (or creates) a database file and initializes the schema.
    pub fn open(path: impl AsRef<Path>) -> ServerResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> ServerResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> ServerResult<Self> {
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn initialize_schema(conn: &Connection) -> ServerResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS resources (
            resource_type TEXT NOT NULL,
            id TEXT NOT NULL,
            version_id INTEGER NOT NULL,
            last_updated TEXT NOT NULL,
            method TEXT NOT NULL,
            body TEXT,
            PRIMARY KEY (resource_type, id)
        );
        CREATE TABLE IF NOT EXISTS resource_history (
            resource_type TEXT NOT NULL,
            id TEXT NOT NULL,
            version_id INTEGER NOT NULL,
            last_updated TEXT NOT NULL,
            method TEXT NOT NULL,
            body TEXT,
            PRIMARY KEY (resource_type, id, version_id)
        );
        CREATE TABLE IF NOT EXISTS search_index (
            resource_type TEXT NOT NULL,
            id TEXT NOT NULL,
            param TEXT NOT NULL,
            kind TEXT NOT NULL,
            value_text TEXT,
            value_system TEXT,
            value_num REAL
        );
        CREATE INDEX IF NOT EXISTS idx_search_index_lookup
            ON search_index (resource_type, param, value_text);
        CREATE INDEX IF NOT EXISTS idx_resources_updated
            ON resources (resource_type, last_updated);",
    )?;
    Ok(())
}

/// Column encoding of an [`IndexedValue`]: (kind, value_text, value_system, value_num).
fn encode_value(value: &IndexedValue) -> (&'static str, Option<&str>, Option<&str>, Option<f64>) {
    match value {
        IndexedValue::Text(s) => ("text", Some(s), None, None),
        IndexedValue::Token { system, code } => ("token", Some(code), system.as_deref(), None),
        IndexedValue::Date(s) => ("date", Some(s), None, None),
        IndexedValue::Reference(s) => ("ref", Some(s), None, None),
        IndexedValue::Number(n) => ("num", None, None, Some(*n)),
    }
}

fn decode_value(
    kind: &str,
    value_text: Option<String>,
    value_system: Option<String>,
    value_num: Option<f64>,
) -> ServerResult<IndexedValue> {
    match kind {
        "text" => Ok(IndexedValue::Text(value_text.unwrap_or_default())),
        "token" => Ok(IndexedValue::Token {
            system: value_system,
            code: value_text.unwrap_or_default(),
        }),
        "date" => Ok(IndexedValue::Date(value_text.unwrap_or_default())),
        "ref" => Ok(IndexedValue::Reference(value_text.unwrap_or_default())),
        "num" => Ok(IndexedValue::Number(value_num.unwrap_or_default())),
        other => Err(ServerError::Storage(format!(
            "unknown index value kind: {other}"
        ))),
    }
}

fn row_to_record(resource_type: &str, id: &str, row: &Row<'_>) -> rusqlite::Result<VersionRecord> {
    let version_id: i64 = row.get(0)?;
    let last_updated: String = row.get(1)?;
    let method: String = row.get(2)?;
    let body: Option<String> = row.get(3)?;
    Ok(VersionRecord {
        resource_type: resource_type.to_string(),
        id: id.to_string(),
        version_id,
        last_updated: parse_instant(&last_updated)?,
        method: parse_method(&method)?,
        body: match body {
            Some(text) => Some(parse_body(&text)?),
            None => None,
        },
    })
}

fn parse_method(text: &str) -> rusqlite::Result<InteractionMethod> {
    InteractionMethod::parse(text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown interaction method: {text}").into(),
        )
    })
}

fn parse_instant(text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn parse_body(text: &str) -> rusqlite::Result<Value> {
    serde_json::from_str(text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

impl Storage for SqliteStorage {
    fn put_version(&self, record: &VersionRecord, index: &[IndexEntry]) -> ServerResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let prior: Option<i64> = tx
            .query_row(
                "SELECT version_id FROM resources WHERE resource_type = ?1 AND id = ?2",
                params![record.resource_type, record.id],
                |row| row.get(0),
            )
            .optional()?;
        let expected = prior.map(|v| v + 1).unwrap_or(1);
        if record.version_id != expected {
            return Err(ServerError::Storage(format!(
                "version numbering gap for {}/{}: expected {}, got {}",
                record.resource_type, record.id, expected, record.version_id
            )));
        }

        let body = record
            .body
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ServerError::Storage(format!("failed to serialize body: {e}")))?;
        let last_updated = record.last_updated_string();
        let method = record.method.as_str();

        tx.execute(
            "INSERT INTO resources (resource_type, id, version_id, last_updated, method, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (resource_type, id) DO UPDATE SET
                version_id = excluded.version_id,
                last_updated = excluded.last_updated,
                method = excluded.method,
                body = excluded.body",
            params![
                record.resource_type,
                record.id,
                record.version_id,
                last_updated,
                method,
                body
            ],
        )?;
        tx.execute(
            "INSERT INTO resource_history (resource_type, id, version_id, last_updated, method, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.resource_type,
                record.id,
                record.version_id,
                last_updated,
                method,
                body
            ],
        )?;

        tx.execute(
            "DELETE FROM search_index WHERE resource_type = ?1 AND id = ?2",
            params![record.resource_type, record.id],
        )?;
        for entry in index {
            let (kind, value_text, value_system, value_num) = encode_value(&entry.value);
            tx.execute(
                "INSERT INTO search_index
                    (resource_type, id, param, kind, value_text, value_system, value_num)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.resource_type,
                    record.id,
                    entry.param,
                    kind,
                    value_text,
                    value_system,
                    value_num
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn current(&self, resource_type: &str, id: &str) -> ServerResult<Option<VersionRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT version_id, last_updated, method, body
                 FROM resources WHERE resource_type = ?1 AND id = ?2",
                params![resource_type, id],
                |row| row_to_record(resource_type, id, row),
            )
            .optional()?;
        Ok(record)
    }

    fn version(
        &self,
        resource_type: &str,
        id: &str,
        version_id: i64,
    ) -> ServerResult<Option<VersionRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT version_id, last_updated, method, body
                 FROM resource_history
                 WHERE resource_type = ?1 AND id = ?2 AND version_id = ?3",
                params![resource_type, id, version_id],
                |row| row_to_record(resource_type, id, row),
            )
            .optional()?;
        Ok(record)
    }

    fn versions(&self, resource_type: &str, id: &str) -> ServerResult<Vec<VersionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT version_id, last_updated, method, body
             FROM resource_history
             WHERE resource_type = ?1 AND id = ?2
             ORDER BY version_id ASC",
        )?;
        let rows = stmt.query_map(params![resource_type, id], |row| {
            row_to_record(resource_type, id, row)
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn live_ids(&self, resource_type: &str) -> ServerResult<BTreeSet<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id FROM resources WHERE resource_type = ?1 AND body IS NOT NULL",
        )?;
        let rows = stmt.query_map(params![resource_type], |row| row.get::<_, String>(0))?;
        let mut ids = BTreeSet::new();
        for row in rows {
            ids.insert(row?);
        }
        Ok(ids)
    }

    fn scan_index(
        &self,
        resource_type: &str,
        param: &str,
        filter: &IndexFilter,
    ) -> ServerResult<BTreeSet<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, kind, value_text, value_system, value_num
             FROM search_index
             WHERE resource_type = ?1 AND param = ?2",
        )?;
        let rows = stmt.query_map(params![resource_type, param], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<f64>>(4)?,
            ))
        })?;

        let mut ids = BTreeSet::new();
        for row in rows {
            let (id, kind, value_text, value_system, value_num) = row?;
            let value = decode_value(&kind, value_text, value_system, value_num)?;
            if filter.matches(&value) {
                ids.insert(id);
            }
        }
        Ok(ids)
    }

    fn scan_last_updated(
        &self,
        resource_type: &str,
        comparator: Comparator,
        instant: DateTime<Utc>,
    ) -> ServerResult<BTreeSet<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, last_updated FROM resources
             WHERE resource_type = ?1 AND body IS NOT NULL",
        )?;
        let rows = stmt.query_map(params![resource_type], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut ids = BTreeSet::new();
        for row in rows {
            let (id, last_updated) = row?;
            let value = parse_instant(&last_updated)?;
            if instant_matches(comparator, value, instant) {
                ids.insert(id);
            }
        }
        Ok(ids)
    }
}
