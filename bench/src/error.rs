//! Error taxonomy of a benchmark run.

use std::fmt;
use std::time::Duration;

/// Failure raised by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("postgres: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    #[error("connection pool: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
    #[error("connection pool setup: {0}")]
    PoolBuild(#[from] deadpool_postgres::CreatePoolError),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid table name {0:?}")]
    InvalidIdentifier(String),
    #[error("exceeded its {0:?} deadline")]
    Timeout(Duration),
}

/// Failure of a single timed query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("query exceeded its {0:?} deadline")]
    Timeout(Duration),
    #[error("store returned a negative count ({0})")]
    NegativeCount(i64),
    #[error("samples disagree on the count ({first} vs {other})")]
    InconsistentSamples { first: u64, other: u64 },
}

/// Which schema a query ran against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Entity-attribute-value tables.
    Baseline,
    /// Denormalized, one row per user.
    Optimized,
}

impl Variant {
    pub fn label(self) -> &'static str {
        match self {
            Variant::Baseline => "EAV Model",
            Variant::Optimized => "Optimized Model",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Top-level failures, classified by how the run reacts to them.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// Fatal: no measurement can be taken.
    #[error("database connection failed: {0}")]
    Connection(#[source] StoreError),
    /// Fatal: the configured table names cannot be used in a query.
    #[error("invalid schema names: {0}")]
    Schema(#[source] StoreError),
    /// Recorded for one arm of one scenario; the run continues.
    #[error("{scenario} [{variant}]: {source}")]
    Query {
        scenario: String,
        variant: Variant,
        #[source]
        source: QueryError,
    },
    /// The row count the extrapolation starts from could not be read.
    #[error("dataset size query failed: {0}")]
    DatasetSize(#[source] QueryError),
    /// Diagnostic only; never aborts the run.
    #[error("query plan unavailable: {0}")]
    Plan(#[source] StoreError),
}
