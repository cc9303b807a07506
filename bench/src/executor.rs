//! Timed query execution.
//!
//! The timer wraps only the query itself: the session is already checked out
//! when [`execute`] is called, so pool acquisition never shows up in a
//! measurement. The same holds for both schemas, which keeps them comparable.

use crate::error::QueryError;
use crate::store::Session;
use std::time::{Duration, Instant};

/// Outcome of timing one query.
///
/// `elapsed` is kept on failure too: the time a failing or timed-out query
/// took is still useful when diagnosing it.
#[derive(Debug)]
pub struct Measurement {
    pub elapsed: Duration,
    pub outcome: Result<u64, QueryError>,
}

impl Measurement {
    pub fn count(&self) -> Option<u64> {
        self.outcome.as_ref().ok().copied()
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Run `sql` once and time it.
///
/// With a `deadline`, a query still running when it expires is abandoned and
/// the session is asked to cancel it server-side. Backends that execute
/// inline cannot be interrupted, so a result that arrives after the deadline
/// is rejected as a timeout as well.
pub async fn execute(session: &mut dyn Session, sql: &str, deadline: Option<Duration>) -> Measurement {
    let start = Instant::now();
    let result = match deadline {
        Some(limit) => match tokio::time::timeout(limit, session.query_count(sql)).await {
            Ok(result) => result.map_err(QueryError::from),
            Err(_) => Err(QueryError::Timeout(limit)),
        },
        None => session.query_count(sql).await.map_err(QueryError::from),
    };
    let elapsed = start.elapsed();

    let outcome = match result {
        Err(QueryError::Timeout(limit)) => {
            if let Err(err) = session.cancel().await {
                log::warn!("Failed to cancel timed-out query: {err}");
            }
            Err(QueryError::Timeout(limit))
        }
        Err(err) => Err(err),
        Ok(count) => match deadline {
            Some(limit) if elapsed > limit => Err(QueryError::Timeout(limit)),
            _ => u64::try_from(count).map_err(|_| QueryError::NegativeCount(count)),
        },
    };

    Measurement { elapsed, outcome }
}

/// Run `sql` `samples` times back to back and report the median duration.
///
/// All samples must return the same count. The first failing sample ends the
/// series, and its measurement is returned as is.
pub async fn execute_sampled(
    session: &mut dyn Session,
    sql: &str,
    deadline: Option<Duration>,
    samples: usize,
) -> Measurement {
    let mut durations = Vec::with_capacity(samples.max(1));
    let mut first_count = None;

    for _ in 0..samples.max(1) {
        let measurement = execute(session, sql, deadline).await;
        let count = match measurement.outcome {
            Ok(count) => count,
            Err(_) => return measurement,
        };
        match first_count {
            None => first_count = Some(count),
            Some(first) if first != count => {
                return Measurement {
                    elapsed: measurement.elapsed,
                    outcome: Err(QueryError::InconsistentSamples { first, other: count }),
                };
            }
            Some(_) => {}
        }
        durations.push(measurement.elapsed);
    }

    Measurement {
        elapsed: median(&mut durations),
        outcome: Ok(first_count.unwrap_or_default()),
    }
}

/// Median of the samples; the mean of the middle two for an even count.
fn median(durations: &mut [Duration]) -> Duration {
    if durations.is_empty() {
        return Duration::ZERO;
    }
    durations.sort_unstable();
    let mid = durations.len() / 2;
    if durations.len() % 2 == 1 {
        durations[mid]
    } else {
        (durations[mid - 1] + durations[mid]) / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use async_trait::async_trait;

    /// Scripted session: returns the queued counts in order, optionally
    /// sleeping before each answer.
    struct ScriptedSession {
        answers: Vec<Result<i64, ()>>,
        delay: Duration,
        cancelled: bool,
    }

    impl ScriptedSession {
        fn new(answers: Vec<Result<i64, ()>>) -> Self {
            Self {
                answers,
                delay: Duration::ZERO,
                cancelled: false,
            }
        }
    }

    #[async_trait]
    impl Session for ScriptedSession {
        async fn query_count(&mut self, _sql: &str) -> Result<i64, StoreError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.answers.remove(0) {
                Ok(count) => Ok(count),
                Err(()) => Err(StoreError::InvalidIdentifier("scripted".to_string())),
            }
        }

        async fn query_plan(&mut self, _explain_sql: &str) -> Result<Vec<String>, StoreError> {
            Ok(vec!["Seq Scan".to_string()])
        }

        async fn cancel(&mut self) -> Result<(), StoreError> {
            self.cancelled = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn successful_query_reports_count_and_time() {
        let mut session = ScriptedSession::new(vec![Ok(40)]);
        let m = execute(&mut session, "SELECT 40", None).await;
        assert_eq!(m.count(), Some(40));
    }

    #[tokio::test]
    async fn failure_keeps_elapsed_time() {
        let mut session = ScriptedSession::new(vec![Err(())]);
        session.delay = Duration::from_millis(5);
        let m = execute(&mut session, "SELECT broken", None).await;
        assert!(matches!(m.outcome, Err(QueryError::Store(_))));
        assert!(m.elapsed >= Duration::from_millis(5));
    }

    #[tokio::test]
    async fn negative_count_is_a_failure() {
        let mut session = ScriptedSession::new(vec![Ok(-3)]);
        let m = execute(&mut session, "SELECT -3", None).await;
        assert!(matches!(m.outcome, Err(QueryError::NegativeCount(-3))));
    }

    #[tokio::test]
    async fn deadline_abandons_and_cancels_slow_query() {
        let mut session = ScriptedSession::new(vec![Ok(1)]);
        session.delay = Duration::from_secs(5);
        let limit = Duration::from_millis(20);
        let m = execute(&mut session, "SELECT pg_sleep(5)", Some(limit)).await;
        assert!(matches!(m.outcome, Err(QueryError::Timeout(d)) if d == limit));
        assert!(session.cancelled);
        assert!(m.elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn sampled_reports_median() {
        let mut session = ScriptedSession::new(vec![Ok(7), Ok(7), Ok(7)]);
        let m = execute_sampled(&mut session, "SELECT 7", None, 3).await;
        assert_eq!(m.count(), Some(7));
        assert!(session.answers.is_empty());
    }

    #[tokio::test]
    async fn sampled_rejects_disagreeing_counts() {
        let mut session = ScriptedSession::new(vec![Ok(7), Ok(8)]);
        let m = execute_sampled(&mut session, "SELECT n", None, 2).await;
        assert!(matches!(
            m.outcome,
            Err(QueryError::InconsistentSamples { first: 7, other: 8 })
        ));
    }

    #[tokio::test]
    async fn sampled_stops_at_first_failure() {
        let mut session = ScriptedSession::new(vec![Ok(7), Err(()), Ok(7)]);
        let m = execute_sampled(&mut session, "SELECT n", None, 3).await;
        assert!(matches!(m.outcome, Err(QueryError::Store(_))));
        assert_eq!(session.answers.len(), 1);
    }

    #[test]
    fn median_of_odd_and_even_sets() {
        let ms = Duration::from_millis;
        assert_eq!(median(&mut [ms(9), ms(1), ms(5)]), ms(5));
        assert_eq!(median(&mut [ms(4), ms(2), ms(8), ms(6)]), ms(5));
        assert_eq!(median(&mut []), Duration::ZERO);
    }
}
