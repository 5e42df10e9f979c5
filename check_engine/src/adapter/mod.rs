//! Uniform SQL execution over heterogeneous backends.
//!
//! Every backend implements [`SqlAdapter`]. The run engine looks adapters up
//! by [`Dialect`] in an [`AdapterRegistry`] and never sees which driver sits
//! behind the trait. Result values are normalized to strings at this
//! boundary: NULL becomes the empty string.

use std::collections::HashMap;
use std::fmt;

use crate::types::{Dialect, Row};

#[cfg(feature = "duckdb")]
pub mod duckdb;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod sqlite;
pub(crate) mod unsupported;

pub use self::sqlite::SqliteAdapter;
pub use self::unsupported::UnsupportedAdapter;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Adapter failures.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The backend could not be reached or rejected the credentials.
    #[error("[A001] {dialect} connection failed: {message}")]
    Connection {
        /// Backend involved.
        dialect: Dialect,
        /// Driver message.
        message: String,
    },

    /// A statement failed.
    #[error("[A002] {dialect} query failed: {message}")]
    Query {
        /// Backend involved.
        dialect: Dialect,
        /// Driver message.
        message: String,
    },

    /// A query was issued before `setup_connection`.
    #[error("[A003] {0} adapter is not connected")]
    NotConnected(Dialect),

    /// The backend is not available in this build.
    #[error("[A004] Feature not implemented for {backend}: {feature}")]
    NotImplemented {
        /// Backend name.
        backend: String,
        /// What was attempted.
        feature: String,
    },
}

/// Result alias for adapter calls.
pub type AdapterResult<T> = Result<T, AdapterError>;

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Blocking execution contract implemented once per backend.
pub trait SqlAdapter: Send {
    /// Backend served by this adapter.
    fn dialect(&self) -> Dialect;

    /// Open the connection.
    ///
    /// # Errors
    ///
    /// [`AdapterError::Connection`] when the backend is unreachable or the
    /// credentials are rejected.
    fn setup_connection(&mut self, connection_string: &str) -> AdapterResult<()>;

    /// Number of rows `query` returns (row cardinality, not a `COUNT(*)` value).
    ///
    /// # Errors
    ///
    /// Any error from [`SqlAdapter::query_sql`].
    fn count_sql(&mut self, query: &str) -> AdapterResult<usize> {
        Ok(self.query_sql(query)?.len())
    }

    /// Run `query` and return its rows, columns in result order.
    ///
    /// # Errors
    ///
    /// [`AdapterError::Query`] when the statement fails.
    fn query_sql(&mut self, query: &str) -> AdapterResult<Vec<Row>>;

    /// Run a statement for its side effects.
    ///
    /// # Errors
    ///
    /// [`AdapterError::Query`] when the statement fails.
    fn execute_sql(&mut self, query: &str) -> AdapterResult<()>;

    /// Close the connection. Calling it again, or before connecting, is a no-op.
    ///
    /// # Errors
    ///
    /// Driver errors raised while closing.
    fn close_connection(&mut self) -> AdapterResult<()>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Builds a fresh, unconnected adapter.
pub type AdapterFactory = Box<dyn Fn() -> Box<dyn SqlAdapter> + Send + Sync>;

/// Dialect-to-adapter lookup table.
pub struct AdapterRegistry {
    factories: HashMap<Dialect, AdapterFactory>,
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dialects: Vec<&Dialect> = self.factories.keys().collect();
        dialects.sort();
        f.debug_struct("AdapterRegistry")
            .field("dialects", &dialects)
            .finish()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl AdapterRegistry {
    /// Registry with no adapters.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with one adapter per supported dialect.
    ///
    /// Backends compiled out of this build (or without a driver) are served
    /// by a stub that fails at connection time.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Dialect::Sqlite, || Box::new(SqliteAdapter::new()));

        #[cfg(feature = "postgres")]
        registry.register(Dialect::Postgres, || {
            Box::new(self::postgres::PostgresAdapter::new())
        });
        #[cfg(not(feature = "postgres"))]
        registry.register(Dialect::Postgres, || {
            Box::new(UnsupportedAdapter::new(
                Dialect::Postgres,
                "built without the `postgres` feature",
            ))
        });

        #[cfg(feature = "duckdb")]
        registry.register(Dialect::DuckDb, || {
            Box::new(self::duckdb::DuckDbAdapter::new())
        });
        #[cfg(not(feature = "duckdb"))]
        registry.register(Dialect::DuckDb, || {
            Box::new(UnsupportedAdapter::new(
                Dialect::DuckDb,
                "built without the `duckdb` feature",
            ))
        });

        registry.register(Dialect::Oracle, || {
            Box::new(UnsupportedAdapter::new(Dialect::Oracle, "no driver available"))
        });
        registry.register(Dialect::SqlServer, || {
            Box::new(UnsupportedAdapter::new(
                Dialect::SqlServer,
                "no driver available",
            ))
        });
        registry
    }

    /// Register or replace the factory for `dialect`.
    pub fn register<F>(&mut self, dialect: Dialect, factory: F)
    where
        F: Fn() -> Box<dyn SqlAdapter> + Send + Sync + 'static,
    {
        self.factories.insert(dialect, Box::new(factory));
    }

    /// A fresh adapter for `dialect`, if one is registered.
    #[must_use]
    pub fn create(&self, dialect: Dialect) -> Option<Box<dyn SqlAdapter>> {
        self.factories.get(&dialect).map(|factory| factory())
    }

    /// Whether `dialect` has a registered adapter.
    #[must_use]
    pub fn supports(&self, dialect: Dialect) -> bool {
        self.factories.contains_key(&dialect)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
