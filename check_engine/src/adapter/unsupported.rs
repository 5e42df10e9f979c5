//! Stub adapter for backends without a driver in this build.

use super::{AdapterError, AdapterResult, SqlAdapter};
use crate::types::{Dialect, Row};

/// Adapter that refuses every operation with [`AdapterError::NotImplemented`].
#[derive(Debug, Clone)]
pub struct UnsupportedAdapter {
    dialect: Dialect,
    reason: &'static str,
}

impl UnsupportedAdapter {
    /// Stub for `dialect`, explaining why in `reason`.
    #[must_use]
    pub fn new(dialect: Dialect, reason: &'static str) -> Self {
        Self { dialect, reason }
    }

    fn not_implemented(&self, feature: &str) -> AdapterError {
        AdapterError::NotImplemented {
            backend: self.dialect.to_string(),
            feature: format!("{feature} ({})", self.reason),
        }
    }
}

impl SqlAdapter for UnsupportedAdapter {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn setup_connection(&mut self, _connection_string: &str) -> AdapterResult<()> {
        Err(self.not_implemented("setup_connection"))
    }

    fn count_sql(&mut self, _query: &str) -> AdapterResult<usize> {
        Err(self.not_implemented("count_sql"))
    }

    fn query_sql(&mut self, _query: &str) -> AdapterResult<Vec<Row>> {
        Err(self.not_implemented("query_sql"))
    }

    fn execute_sql(&mut self, _query: &str) -> AdapterResult<()> {
        Err(self.not_implemented("execute_sql"))
    }

    fn close_connection(&mut self) -> AdapterResult<()> {
        Ok(())
    }
}
