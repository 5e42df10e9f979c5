//! DuckDB backend.
//!
//! An empty connection string or `:memory:` opens an in-memory database,
//! anything else is a database file path.

use chrono::{DateTime, NaiveTime, Utc};
use duckdb::types::Value;
use duckdb::Connection;

use super::{AdapterError, AdapterResult, SqlAdapter};
use crate::types::{Dialect, Row};

/// DuckDB adapter.
#[derive(Default)]
pub struct DuckDbAdapter {
    conn: Option<Connection>,
}

impl std::fmt::Debug for DuckDbAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbAdapter")
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

impl DuckDbAdapter {
    /// Unconnected adapter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn conn(&self) -> AdapterResult<&Connection> {
        self.conn
            .as_ref()
            .ok_or(AdapterError::NotConnected(Dialect::DuckDb))
    }
}

fn query_error(e: duckdb::Error) -> AdapterError {
    AdapterError::Query {
        dialect: Dialect::DuckDb,
        message: e.to_string(),
    }
}

/// Read a column value as text. NULL reads as the empty string.
fn get_column_as_string(row: &duckdb::Row<'_>, idx: usize) -> String {
    match row.get::<_, Value>(idx) {
        Ok(value) => value_to_string(&value),
        Err(_) => String::new(),
    }
}

/// Render a DuckDB value the way the DuckDB shell prints it, as far as
/// scalars and temporal types go. Nested types use their debug form.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Boolean(b) => b.to_string(),
        Value::TinyInt(n) => n.to_string(),
        Value::SmallInt(n) => n.to_string(),
        Value::Int(n) => n.to_string(),
        Value::BigInt(n) => n.to_string(),
        Value::HugeInt(n) => n.to_string(),
        Value::UTinyInt(n) => n.to_string(),
        Value::USmallInt(n) => n.to_string(),
        Value::UInt(n) => n.to_string(),
        Value::UBigInt(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Double(f) => f.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::Text(s) | Value::Enum(s) => s.clone(),
        Value::Blob(bytes) => hex::encode(bytes),
        Value::Date32(days) => DateTime::<Utc>::from_timestamp(i64::from(*days) * 86_400, 0)
            .map(|dt| dt.date_naive().to_string())
            .unwrap_or_else(|| days.to_string()),
        Value::Timestamp(unit, v) => DateTime::<Utc>::from_timestamp_micros(unit.to_micros(*v))
            .map(|dt| dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string())
            .unwrap_or_else(|| v.to_string()),
        Value::Time64(unit, v) => {
            let micros = unit.to_micros(*v);
            u32::try_from(micros / 1_000_000)
                .ok()
                .zip(u32::try_from((micros % 1_000_000) * 1_000).ok())
                .and_then(|(secs, nanos)| NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos))
                .map(|t| t.format("%H:%M:%S%.f").to_string())
                .unwrap_or_else(|| v.to_string())
        }
        Value::Interval {
            months,
            days,
            nanos,
        } => format!("{months} months {days} days {nanos} ns"),
        Value::List(items) | Value::Array(items) => format!(
            "[{}]",
            items.iter().map(value_to_string).collect::<Vec<_>>().join(", ")
        ),
        other => format!("{other:?}"),
    }
}

impl SqlAdapter for DuckDbAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::DuckDb
    }

    fn setup_connection(&mut self, connection_string: &str) -> AdapterResult<()> {
        let target = connection_string.trim();
        let conn = if target.is_empty() || target == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(target)
        }
        .map_err(|e| AdapterError::Connection {
            dialect: Dialect::DuckDb,
            message: e.to_string(),
        })?;
        self.conn = Some(conn);
        Ok(())
    }

    fn query_sql(&mut self, query: &str) -> AdapterResult<Vec<Row>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(query).map_err(query_error)?;

        // Column metadata is only valid once the statement has executed.
        let raw_rows: Vec<Vec<String>> = stmt
            .query_map([], |row| {
                let col_count = row.as_ref().column_count();
                Ok((0..col_count)
                    .map(|i| get_column_as_string(row, i))
                    .collect())
            })
            .map_err(query_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)?;

        let column_names: Vec<String> = (0..stmt.column_count())
            .map(|i| stmt.column_name(i).map_or("?".to_string(), |v| v.to_string()))
            .collect();

        Ok(raw_rows
            .into_iter()
            .map(|values| column_names.iter().cloned().zip(values).collect())
            .collect())
    }

    fn execute_sql(&mut self, query: &str) -> AdapterResult<()> {
        self.conn()?.execute_batch(query).map_err(query_error)
    }

    fn close_connection(&mut self) -> AdapterResult<()> {
        match self.conn.take() {
            None => Ok(()),
            Some(conn) => conn.close().map_err(|(_, e)| AdapterError::Connection {
                dialect: Dialect::DuckDb,
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_query() {
        let mut adapter = DuckDbAdapter::new();
        adapter.setup_connection("").unwrap();
        adapter
            .execute_sql("CREATE TABLE t AS SELECT * FROM (VALUES (1, 'a'), (2, NULL)) v(id, name)")
            .unwrap();
        let rows = adapter.query_sql("SELECT id, name FROM t ORDER BY id").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], "1");
        assert_eq!(rows[0]["name"], "a");
        assert_eq!(rows[1]["name"], "");
        assert_eq!(adapter.count_sql("SELECT * FROM t").unwrap(), 2);
        adapter.close_connection().unwrap();
        adapter.close_connection().unwrap();
    }

    #[test]
    fn test_temporal_and_decimal_values_as_text() {
        let mut adapter = DuckDbAdapter::new();
        adapter.setup_connection(":memory:").unwrap();
        let rows = adapter
            .query_sql(
                "SELECT DATE '2024-03-01' AS d, \
                 TIMESTAMP '2024-03-01 12:34:56' AS ts, \
                 CAST(12.50 AS DECIMAL(10, 2)) AS amount, \
                 TRUE AS flag, \
                 [1, 2] AS items",
            )
            .unwrap();
        assert_eq!(rows[0]["d"], "2024-03-01");
        assert_eq!(rows[0]["ts"], "2024-03-01 12:34:56");
        assert_eq!(rows[0]["amount"], "12.50");
        assert_eq!(rows[0]["flag"], "true");
        assert_eq!(rows[0]["items"], "[1, 2]");
    }

    #[test]
    fn test_changed_date_is_visible() {
        let mut adapter = DuckDbAdapter::new();
        adapter.setup_connection("").unwrap();
        let before = adapter.query_sql("SELECT 1 AS id, DATE '2024-03-01' AS d").unwrap();
        let after = adapter.query_sql("SELECT 1 AS id, DATE '2024-03-02' AS d").unwrap();
        assert!(!crate::merge::rows_equal(&after[0], &before[0], "approved"));
    }
}
