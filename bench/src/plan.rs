//! Plan inspection: shows how the store executes a query.
//!
//! The output is for people. Plan text depends on the engine and its version,
//! so nothing in the harness parses it.

use crate::error::StoreError;
use crate::store::{Dialect, Session};
use std::time::{Duration, Instant};

/// Execution plan of one query, one entry per plan line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    lines: Vec<String>,
}

impl QueryPlan {
    pub fn lines(&self) -> impl Iterator<Item = &str> + '_ {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Run the plan-revealing form of `sql`. To see a fresh plan, call this
/// again; a `QueryPlan` is a snapshot.
///
/// `EXPLAIN ANALYZE` executes the query, so the plan step honours the same
/// per-query `deadline` as a timed measurement.
pub async fn explain(
    session: &mut dyn Session,
    dialect: Dialect,
    sql: &str,
    deadline: Option<Duration>,
) -> Result<QueryPlan, StoreError> {
    let directive = dialect.explain(sql.trim());
    let start = Instant::now();
    let result = match deadline {
        Some(limit) => match tokio::time::timeout(limit, session.query_plan(&directive)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(limit)),
        },
        None => session.query_plan(&directive).await,
    };

    let lines = match result {
        Err(StoreError::Timeout(limit)) => {
            if let Err(err) = session.cancel().await {
                log::warn!("Failed to cancel timed-out plan query: {err}");
            }
            return Err(StoreError::Timeout(limit));
        }
        Err(err) => return Err(err),
        Ok(lines) => match deadline {
            Some(limit) if start.elapsed() > limit => return Err(StoreError::Timeout(limit)),
            _ => lines,
        },
    };
    log::debug!("Plan has {} line(s)", lines.len());
    Ok(QueryPlan { lines })
}
