//! Linear latency extrapolation to a larger dataset.
//!
//! Assumes query cost grows in proportion to row count. Partition count,
//! cache pressure and planner choices all bend that curve at scale, so the
//! projection is a coarse estimate and is reported as one.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ExtrapolationError {
    #[error("cannot extrapolate from an empty dataset")]
    EmptyDataset,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extrapolation {
    pub measured: Duration,
    pub measured_n: u64,
    pub target_n: u64,
    pub projected: Duration,
    pub budget: Duration,
    pub passed: bool,
}

impl Extrapolation {
    pub fn scale_factor(&self) -> f64 {
        self.target_n as f64 / self.measured_n as f64
    }
}

/// Project `measured` (taken at `measured_n` rows) to `target_n` rows and
/// compare against `budget`. Passing means strictly below the budget.
///
/// A target smaller than the measured size is projected like any other.
pub fn extrapolate(
    measured: Duration,
    measured_n: u64,
    target_n: u64,
    budget: Duration,
) -> Result<Extrapolation, ExtrapolationError> {
    if measured_n == 0 {
        return Err(ExtrapolationError::EmptyDataset);
    }
    let factor = target_n as f64 / measured_n as f64;
    // Float-to-int `as` saturates, so absurd projections clamp to the max.
    let projected = Duration::from_nanos((measured.as_nanos() as f64 * factor).round() as u64);

    Ok(Extrapolation {
        measured,
        measured_n,
        target_n,
        projected,
        budget,
        passed: projected < budget,
    })
}
