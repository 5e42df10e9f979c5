//! SQLite backend over `rusqlite`.
//!
//! An empty connection string or `:memory:` opens an in-memory database.
//! Anything else is a path (an optional `sqlite://` prefix is stripped). The
//! file must already exist: a typo in the path is a connection error rather
//! than a fresh empty database.

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use super::{AdapterError, AdapterResult, SqlAdapter};
use crate::types::{Dialect, Row};

/// SQLite adapter.
#[derive(Debug, Default)]
pub struct SqliteAdapter {
    conn: Option<Connection>,
}

impl SqliteAdapter {
    /// Unconnected adapter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn conn(&self) -> AdapterResult<&Connection> {
        self.conn
            .as_ref()
            .ok_or(AdapterError::NotConnected(Dialect::Sqlite))
    }
}

fn query_error(e: rusqlite::Error) -> AdapterError {
    AdapterError::Query {
        dialect: Dialect::Sqlite,
        message: e.to_string(),
    }
}

/// Render a SQLite value the way it is persisted and compared.
fn value_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => hex::encode(b),
    }
}

impl SqlAdapter for SqliteAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn setup_connection(&mut self, connection_string: &str) -> AdapterResult<()> {
        let target = connection_string.trim();
        let target = target.strip_prefix("sqlite://").unwrap_or(target);

        let conn = if target.is_empty() || target == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open_with_flags(
                target,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        }
        .map_err(|e| AdapterError::Connection {
            dialect: Dialect::Sqlite,
            message: e.to_string(),
        })?;

        self.conn = Some(conn);
        Ok(())
    }

    fn query_sql(&mut self, query: &str) -> AdapterResult<Vec<Row>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(query).map_err(query_error)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_owned)
            .collect();

        let mut rows = stmt.query([]).map_err(query_error)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(query_error)? {
            let mut record = Row::with_capacity(columns.len());
            for (idx, name) in columns.iter().enumerate() {
                let value = row.get_ref(idx).map_err(query_error)?;
                record.insert(name.clone(), value_to_string(value));
            }
            out.push(record);
        }
        Ok(out)
    }

    fn execute_sql(&mut self, query: &str) -> AdapterResult<()> {
        self.conn()?.execute_batch(query).map_err(query_error)
    }

    fn close_connection(&mut self) -> AdapterResult<()> {
        match self.conn.take() {
            None => Ok(()),
            Some(conn) => conn.close().map_err(|(_, e)| AdapterError::Connection {
                dialect: Dialect::Sqlite,
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn connected() -> SqliteAdapter {
        let mut adapter = SqliteAdapter::new();
        adapter.setup_connection("").unwrap();
        adapter
    }

    #[test]
    fn test_query_values_normalized() {
        let mut adapter = connected();
        let rows = adapter
            .query_sql("SELECT 1 AS id, 'Jeff' AS name, NULL AS note, 2.5 AS score, x'0aff' AS raw")
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row["id"], "1");
        assert_eq!(row["name"], "Jeff");
        assert_eq!(row["note"], "");
        assert_eq!(row["score"], "2.5");
        assert_eq!(row["raw"], "0aff");
        let columns: Vec<&str> = row.keys().map(String::as_str).collect();
        assert_eq!(columns, vec!["id", "name", "note", "score", "raw"]);
    }

    #[test]
    fn test_count_is_row_cardinality() {
        let mut adapter = connected();
        adapter
            .execute_sql("CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1), (2), (3);")
            .unwrap();
        assert_eq!(adapter.count_sql("SELECT * FROM t").unwrap(), 3);
        assert_eq!(adapter.count_sql("SELECT COUNT(*) FROM t").unwrap(), 1);
    }

    #[test]
    fn test_query_before_connect() {
        let mut adapter = SqliteAdapter::new();
        let err = adapter.query_sql("SELECT 1").unwrap_err();
        assert!(matches!(err, AdapterError::NotConnected(Dialect::Sqlite)));
    }

    #[test]
    fn test_bad_query_is_query_error() {
        let mut adapter = connected();
        let err = adapter.query_sql("SELECT * FROM missing").unwrap_err();
        assert!(matches!(err, AdapterError::Query { .. }));
    }

    #[test]
    fn test_missing_database_file_is_connection_error() {
        let dir = tempdir().unwrap();
        let mut adapter = SqliteAdapter::new();
        let path = dir.path().join("absent.db");
        let err = adapter
            .setup_connection(path.to_str().unwrap())
            .unwrap_err();
        assert!(matches!(err, AdapterError::Connection { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_existing_database_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (7);")
            .unwrap();

        let mut adapter = SqliteAdapter::new();
        adapter
            .setup_connection(&format!("sqlite://{}", path.display()))
            .unwrap();
        let rows = adapter.query_sql("SELECT id FROM t").unwrap();
        assert_eq!(rows[0]["id"], "7");
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut adapter = connected();
        adapter.close_connection().unwrap();
        adapter.close_connection().unwrap();
        assert!(adapter.query_sql("SELECT 1").is_err());
    }
}
