//! PostgreSQL backend over the synchronous `postgres` client.
//!
//! Queries go through the simple query protocol, so every value arrives in
//! the server's text representation and no per-type decoding is needed.

use postgres::{Client, NoTls, SimpleQueryMessage};

use super::{AdapterError, AdapterResult, SqlAdapter};
use crate::types::{Dialect, Row};

/// PostgreSQL adapter.
#[derive(Default)]
pub struct PostgresAdapter {
    client: Option<Client>,
}

impl std::fmt::Debug for PostgresAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresAdapter")
            .field("connected", &self.client.is_some())
            .finish()
    }
}

impl PostgresAdapter {
    /// Unconnected adapter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&mut self) -> AdapterResult<&mut Client> {
        self.client
            .as_mut()
            .ok_or(AdapterError::NotConnected(Dialect::Postgres))
    }
}

fn query_error(e: postgres::Error) -> AdapterError {
    AdapterError::Query {
        dialect: Dialect::Postgres,
        message: e.to_string(),
    }
}

impl SqlAdapter for PostgresAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn setup_connection(&mut self, connection_string: &str) -> AdapterResult<()> {
        let client =
            Client::connect(connection_string, NoTls).map_err(|e| AdapterError::Connection {
                dialect: Dialect::Postgres,
                message: e.to_string(),
            })?;
        self.client = Some(client);
        Ok(())
    }

    fn query_sql(&mut self, query: &str) -> AdapterResult<Vec<Row>> {
        let messages = self.client()?.simple_query(query).map_err(query_error)?;
        let mut out = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                let record: Row = row
                    .columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| (col.name().to_owned(), row.get(idx).unwrap_or("").to_owned()))
                    .collect();
                out.push(record);
            }
        }
        Ok(out)
    }

    fn execute_sql(&mut self, query: &str) -> AdapterResult<()> {
        self.client()?.batch_execute(query).map_err(query_error)
    }

    fn close_connection(&mut self) -> AdapterResult<()> {
        match self.client.take() {
            None => Ok(()),
            Some(client) => client.close().map_err(|e| AdapterError::Connection {
                dialect: Dialect::Postgres,
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_before_connect() {
        let mut adapter = PostgresAdapter::new();
        let err = adapter.query_sql("SELECT 1").unwrap_err();
        assert!(matches!(err, AdapterError::NotConnected(Dialect::Postgres)));
    }

    #[test]
    fn test_invalid_connection_string_is_connection_error() {
        let mut adapter = PostgresAdapter::new();
        let err = adapter
            .setup_connection("this is not a connection string=")
            .unwrap_err();
        assert!(matches!(err, AdapterError::Connection { .. }));
    }

    #[test]
    fn test_close_without_connection() {
        let mut adapter = PostgresAdapter::new();
        adapter.close_connection().unwrap();
        adapter.close_connection().unwrap();
    }
}
