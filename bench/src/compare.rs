//! Comparison engine: times each scenario on both schemas and derives the
//! speedup of the denormalized schema over the EAV one.

use crate::error::{BenchError, Variant};
use crate::executor::{execute_sampled, Measurement};
use crate::scenario::QueryScenario;
use crate::store::Session;
use std::time::Duration;

/// One side of a comparison, with failures tagged by scenario and variant.
#[derive(Debug)]
pub struct Arm {
    pub variant: Variant,
    pub elapsed: Duration,
    pub outcome: Result<u64, BenchError>,
}

impl Arm {
    pub fn from_measurement(scenario: &str, variant: Variant, measurement: Measurement) -> Self {
        Self {
            variant,
            elapsed: measurement.elapsed,
            outcome: measurement.outcome.map_err(|source| BenchError::Query {
                scenario: scenario.to_string(),
                variant,
                source,
            }),
        }
    }

    pub fn count(&self) -> Option<u64> {
        self.outcome.as_ref().ok().copied()
    }

    /// Duration usable for ratios: the arm succeeded and took measurable time.
    fn ratio_duration(&self) -> Option<Duration> {
        (self.outcome.is_ok() && !self.elapsed.is_zero()).then_some(self.elapsed)
    }
}

#[derive(Debug)]
pub struct ComparisonResult {
    pub scenario: &'static str,
    pub predicate: &'static str,
    pub baseline: Arm,
    pub optimized: Arm,
}

impl ComparisonResult {
    /// `baseline / optimized`, or `None` when either arm failed or has a
    /// zero duration. Never infinite or NaN.
    pub fn speedup(&self) -> Option<f64> {
        let baseline = self.baseline.ratio_duration()?;
        let optimized = self.optimized.ratio_duration()?;
        let ratio = baseline.as_secs_f64() / optimized.as_secs_f64();
        ratio.is_finite().then_some(ratio)
    }

    /// Whether both arms counted the same users. `None` if either failed.
    pub fn counts_agree(&self) -> Option<bool> {
        Some(self.baseline.count()? == self.optimized.count()?)
    }

    pub fn arms(&self) -> [&Arm; 2] {
        [&self.baseline, &self.optimized]
    }
}

/// Σ baseline / Σ optimized over the comparisons whose speedup is defined.
pub fn aggregate_speedup(results: &[ComparisonResult]) -> Option<f64> {
    let (baseline, optimized) = results
        .iter()
        .filter(|r| r.speedup().is_some())
        .fold((Duration::ZERO, Duration::ZERO), |(b, o), r| {
            (b + r.baseline.elapsed, o + r.optimized.elapsed)
        });
    if optimized.is_zero() {
        return None;
    }
    let ratio = baseline.as_secs_f64() / optimized.as_secs_f64();
    ratio.is_finite().then_some(ratio)
}

/// Runs scenarios one at a time on a single session.
pub struct ComparisonEngine<'a> {
    session: &'a mut dyn Session,
    deadline: Option<Duration>,
    samples: usize,
}

impl<'a> ComparisonEngine<'a> {
    pub fn new(session: &'a mut dyn Session, deadline: Option<Duration>, samples: usize) -> Self {
        Self {
            session,
            deadline,
            samples,
        }
    }

    /// Baseline first, then optimized, always in that order. A failing
    /// baseline does not skip the optimized arm.
    pub async fn run(&mut self, scenario: &QueryScenario) -> ComparisonResult {
        let baseline = self.measure(scenario, Variant::Baseline, &scenario.baseline_sql).await;
        let optimized = self.measure(scenario, Variant::Optimized, &scenario.optimized_sql).await;

        let result = ComparisonResult {
            scenario: scenario.name,
            predicate: scenario.predicate,
            baseline,
            optimized,
        };
        match result.speedup() {
            Some(speedup) => log::info!("{}: {:.1}x speedup", scenario.name, speedup),
            None => log::info!("{}: speedup undefined", scenario.name),
        }
        if result.counts_agree() == Some(false) {
            log::warn!(
                "{}: schemas disagree ({:?} vs {:?} users)",
                scenario.name,
                result.baseline.count(),
                result.optimized.count()
            );
        }
        result
    }

    pub async fn run_all(&mut self, scenarios: &[QueryScenario]) -> Vec<ComparisonResult> {
        let mut results = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            results.push(self.run(scenario).await);
        }
        results
    }

    async fn measure(&mut self, scenario: &QueryScenario, variant: Variant, sql: &str) -> Arm {
        let measurement = execute_sampled(&mut *self.session, sql, self.deadline, self.samples).await;
        let arm = Arm::from_measurement(scenario.name, variant, measurement);
        match &arm.outcome {
            Ok(count) => log::debug!("{} [{}]: {} users in {:?}", scenario.name, variant, count, arm.elapsed),
            Err(err) => log::error!("{err}"),
        }
        arm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{QueryError, StoreError};

    fn ok_arm(variant: Variant, ms: u64, count: u64) -> Arm {
        Arm {
            variant,
            elapsed: Duration::from_millis(ms),
            outcome: Ok(count),
        }
    }

    fn failed_arm(variant: Variant, ms: u64) -> Arm {
        Arm::from_measurement(
            "single equality",
            variant,
            Measurement {
                elapsed: Duration::from_millis(ms),
                outcome: Err(QueryError::Store(StoreError::InvalidIdentifier(
                    "missing".to_string(),
                ))),
            },
        )
    }

    fn result(baseline: Arm, optimized: Arm) -> ComparisonResult {
        ComparisonResult {
            scenario: "single equality",
            predicate: "country = 'US'",
            baseline,
            optimized,
        }
    }

    #[test]
    fn speedup_is_the_duration_ratio() {
        let r = result(ok_arm(Variant::Baseline, 300, 40), ok_arm(Variant::Optimized, 12, 40));
        assert!((r.speedup().unwrap() - 25.0).abs() < 1e-9);
        assert_eq!(r.counts_agree(), Some(true));
    }

    #[test]
    fn failed_arm_leaves_speedup_undefined() {
        let r = result(failed_arm(Variant::Baseline, 300), ok_arm(Variant::Optimized, 12, 40));
        assert_eq!(r.speedup(), None);
        assert_eq!(r.counts_agree(), None);

        let r = result(ok_arm(Variant::Baseline, 300, 40), failed_arm(Variant::Optimized, 12));
        assert_eq!(r.speedup(), None);
    }

    #[test]
    fn zero_duration_leaves_speedup_undefined() {
        let r = result(ok_arm(Variant::Baseline, 300, 40), ok_arm(Variant::Optimized, 0, 40));
        assert_eq!(r.speedup(), None);
        let r = result(ok_arm(Variant::Baseline, 0, 40), ok_arm(Variant::Optimized, 5, 40));
        assert_eq!(r.speedup(), None);
    }

    #[test]
    fn failure_carries_scenario_and_variant() {
        let arm = failed_arm(Variant::Optimized, 1);
        let message = arm.outcome.unwrap_err().to_string();
        assert!(message.starts_with("single equality [Optimized Model]"), "{message}");
    }

    #[test]
    fn count_mismatch_is_detected() {
        let r = result(ok_arm(Variant::Baseline, 3, 41), ok_arm(Variant::Optimized, 1, 40));
        assert_eq!(r.counts_agree(), Some(false));
    }

    #[test]
    fn aggregate_is_ratio_of_sums_over_defined_pairs() {
        let results = vec![
            result(ok_arm(Variant::Baseline, 300, 40), ok_arm(Variant::Optimized, 10, 40)),
            result(ok_arm(Variant::Baseline, 100, 60), ok_arm(Variant::Optimized, 30, 60)),
            result(failed_arm(Variant::Baseline, 900), ok_arm(Variant::Optimized, 1, 9)),
        ];
        assert!((aggregate_speedup(&results).unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn aggregate_without_defined_pairs_is_undefined() {
        let results = vec![result(
            failed_arm(Variant::Baseline, 900),
            ok_arm(Variant::Optimized, 1, 9),
        )];
        assert_eq!(aggregate_speedup(&results), None);
        assert_eq!(aggregate_speedup(&[]), None);
    }
}
