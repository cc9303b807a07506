//! Report module: prints human-readable benchmark results and pass/fail verdict.

use crate::compare::{aggregate_speedup, Arm, ComparisonResult};
use crate::error::BenchError;
use crate::extrapolate::Extrapolation;
use crate::plan::QueryPlan;
use std::io::{self, Write};
use std::time::Duration;

/// Everything one run produced, ready to render.
#[derive(Debug)]
pub struct Report {
    pub backend: &'static str,
    pub dataset_size: Result<u64, BenchError>,
    pub comparisons: Vec<ComparisonResult>,
    /// Plan of the first scenario's optimized query, and which scenario.
    pub plan: Option<(&'static str, Result<QueryPlan, BenchError>)>,
    /// The projection, or why there is none.
    pub extrapolation: Result<Extrapolation, String>,
    pub budget: Duration,
    pub samples: usize,
}

impl Report {
    pub fn aggregate_speedup(&self) -> Option<f64> {
        aggregate_speedup(&self.comparisons)
    }

    /// Every optimized query succeeded and came in under the budget.
    /// `None` when an optimized query failed or nothing was measured.
    pub fn within_budget(&self) -> Option<bool> {
        if self.comparisons.is_empty() {
            return None;
        }
        let mut all = true;
        for result in &self.comparisons {
            result.optimized.count()?;
            all &= result.optimized.elapsed < self.budget;
        }
        Some(all)
    }

    /// Counts of every arm, in scenario order. Two runs over unchanged data
    /// produce the same list.
    pub fn counts(&self) -> Vec<Option<u64>> {
        self.comparisons
            .iter()
            .flat_map(|r| r.arms().map(Arm::count))
            .collect()
    }

    pub fn render<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "\n{}", "=".repeat(80))?;
        writeln!(w, "  Audience Query Benchmark Report ({})", self.backend)?;
        writeln!(
            w,
            "  Budget: {} per audience count | Samples per query: {}",
            format_duration(self.budget),
            self.samples
        )?;
        writeln!(w, "{}", "=".repeat(80))?;

        match &self.dataset_size {
            Ok(n) => writeln!(w, "\n  Test dataset:     {n} users")?,
            Err(err) => writeln!(w, "\n  Test dataset:     unknown ({err})")?,
        }

        for (i, result) in self.comparisons.iter().enumerate() {
            writeln!(
                w,
                "\n  Test {}: {} ({})",
                i + 1,
                result.scenario,
                result.predicate
            )?;
            writeln!(w, "  {}", "-".repeat(60))?;
            for arm in result.arms() {
                let label = format!("{}:", arm.variant);
                match &arm.outcome {
                    Ok(count) => writeln!(
                        w,
                        "  {:18}{:>10} users in {:>10}",
                        label,
                        count,
                        format_duration(arm.elapsed)
                    )?,
                    Err(err) => writeln!(
                        w,
                        "  {:18}FAILED after {} - {}",
                        label,
                        format_duration(arm.elapsed),
                        err
                    )?,
                }
            }
            writeln!(w, "  {:18}{:>10}", "Speedup:", format_speedup(result.speedup()))?;
            if result.counts_agree() == Some(false) {
                writeln!(
                    w,
                    "  WARNING: the two schemas returned different counts for this predicate"
                )?;
            }
        }

        if let Some((scenario, plan)) = &self.plan {
            writeln!(w, "\n  Query plan (Optimized Model, {scenario}):")?;
            match plan {
                Ok(plan) => {
                    for line in plan.lines() {
                        writeln!(w, "     {line}")?;
                    }
                }
                Err(err) => writeln!(w, "     {err}")?,
            }
        }

        writeln!(w, "\n  Summary:")?;
        writeln!(w, "  {}", "-".repeat(60))?;
        match &self.dataset_size {
            Ok(n) => writeln!(w, "  {:18}{} users", "Dataset size:", n)?,
            Err(_) => writeln!(w, "  {:18}unknown", "Dataset size:")?,
        }
        writeln!(
            w,
            "  {:18}{}",
            "Average speedup:",
            format_speedup(self.aggregate_speedup())
        )?;
        let within = match self.within_budget() {
            Some(true) => "YES",
            Some(false) => "NO",
            None => "n/a",
        };
        writeln!(w, "  {:18}{}", "Within budget:", within)?;

        writeln!(w, "\n  Extrapolation (linear estimate, not a guarantee):")?;
        writeln!(w, "  {}", "-".repeat(60))?;
        match &self.extrapolation {
            Ok(e) => {
                writeln!(
                    w,
                    "  {:18}{} at {} users",
                    "Measured:",
                    format_duration(e.measured),
                    e.measured_n
                )?;
                writeln!(
                    w,
                    "  {:18}{} users (x{:.1})",
                    "Target size:",
                    e.target_n,
                    e.scale_factor()
                )?;
                writeln!(w, "  {:18}{}", "Estimated time:", format_duration(e.projected))?;
                writeln!(w, "  {:18}{}", "Budget:", format_duration(e.budget))?;
                writeln!(
                    w,
                    "  {:18}{}",
                    "Verdict:",
                    if e.passed { "PASS" } else { "FAIL" }
                )?;
            }
            Err(reason) => writeln!(w, "  {:18}n/a ({reason})", "Verdict:")?,
        }

        writeln!(w)?;
        Ok(())
    }
}

/// Print the report to stdout.
pub fn print_report(report: &Report) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    report.render(&mut out)?;
    out.flush()
}

fn format_speedup(speedup: Option<f64>) -> String {
    match speedup {
        Some(s) => format!("{s:.1}x"),
        None => "n/a".to_string(),
    }
}

/// Adaptive unit: µs below a millisecond, ms below a second, else seconds.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs >= 1.0 {
        format!("{secs:.2}s")
    } else if secs >= 1e-3 {
        format!("{:.2}ms", secs * 1e3)
    } else {
        format!("{:.0}µs", secs * 1e6)
    }
}
