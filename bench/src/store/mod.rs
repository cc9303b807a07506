//! Storage backends and the common `Store` / `Session` traits.
//!
//! Two implementations are provided:
//! - [`postgres::PgStore`]: pooled PostgreSQL connections, used for real runs
//! - [`sqlite::SqliteStore`]: a single embedded SQLite connection, used by the
//!   demo mode and the test suite

pub mod postgres;
pub mod sqlite;

use crate::error::StoreError;
use async_trait::async_trait;

/// SQL flavour of a backend. Only the plan directive differs between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Wrap `sql` so the backend returns its execution plan instead of rows.
    /// PostgreSQL also executes the query and annotates actual timings.
    pub fn explain(self, sql: &str) -> String {
        match self {
            Dialect::Postgres => format!("EXPLAIN ANALYZE {sql}"),
            Dialect::Sqlite => format!("EXPLAIN QUERY PLAN {sql}"),
        }
    }
}

/// A source of sessions against a database holding both schemas.
#[async_trait]
pub trait Store: Send + Sync {
    /// Human-readable name for logs and reports.
    fn name(&self) -> &'static str;

    fn dialect(&self) -> Dialect;

    /// Liveness check. Must succeed before any measurement is taken.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Check out a session. Acquisition happens outside any timed section.
    async fn session(&self) -> Result<Box<dyn Session>, StoreError>;
}

/// One checked-out connection. The harness issues one query at a time.
#[async_trait]
pub trait Session: Send {
    /// Run a query returning a single integer cell (a `COUNT`).
    async fn query_count(&mut self, sql: &str) -> Result<i64, StoreError>;

    /// Run a plan query and return its rows rendered as text.
    async fn query_plan(&mut self, explain_sql: &str) -> Result<Vec<String>, StoreError>;

    /// Ask the server to abandon whatever this session is running. Used when
    /// a query misses its deadline. Backends without server-side work to
    /// cancel keep the default.
    async fn cancel(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}
