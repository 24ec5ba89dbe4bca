//! Accounting cycles.
//!
//! Cycles are fixed-length windows aligned to the unix epoch: a cycle of
//! `cycle_secs` starts at every multiple of `cycle_secs`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EstimateError;

/// The cycle containing a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleWindow {
    pub cycle_duration_secs: u64,
    pub current_cycle_start_date: DateTime<Utc>,
    pub next_cycle_start_date: DateTime<Utc>,
}

impl CycleWindow {
    /// Compute the cycle of length `cycle_secs` that contains `now`.
    pub fn containing(cycle_secs: u64, now: DateTime<Utc>) -> Result<Self, EstimateError> {
        if cycle_secs == 0 {
            return Err(EstimateError::InvalidInput("cycle length must be positive".into()));
        }
        let now_secs = u64::try_from(now.timestamp()).map_err(|_| {
            EstimateError::InvalidInput(format!("{now} is before the unix epoch"))
        })?;
        let start = now_secs - now_secs % cycle_secs;
        Ok(Self {
            cycle_duration_secs: cycle_secs,
            current_cycle_start_date: to_date(start)?,
            next_cycle_start_date: to_date(start + cycle_secs)?,
        })
    }

    /// Start of the current cycle in unix seconds.
    ///
    /// Fails for windows placed before the epoch.
    pub fn current_start_secs(&self) -> Result<u64, EstimateError> {
        to_secs(self.current_cycle_start_date)
    }

    pub fn next_start_secs(&self) -> Result<u64, EstimateError> {
        to_secs(self.next_cycle_start_date)
    }

    /// Returns `true` if `timestamp` falls in `[current start, next start)`.
    pub fn contains(&self, timestamp: u64) -> bool {
        let ts = i128::from(timestamp);
        ts >= i128::from(self.current_cycle_start_date.timestamp())
            && ts < i128::from(self.next_cycle_start_date.timestamp())
    }
}

fn to_secs(date: DateTime<Utc>) -> Result<u64, EstimateError> {
    u64::try_from(date.timestamp())
        .map_err(|_| EstimateError::InvalidInput(format!("cycle boundary {date} is before the unix epoch")))
}

fn to_date(secs: u64) -> Result<DateTime<Utc>, EstimateError> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .ok_or_else(|| EstimateError::InvalidInput(format!("timestamp {secs} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn window_is_epoch_aligned() {
        let w = CycleWindow::containing(100, at(1_234)).unwrap();
        assert_eq!(w.current_start_secs().unwrap(), 1_200);
        assert_eq!(w.next_start_secs().unwrap(), 1_300);
        assert!(w.contains(1_200));
        assert!(w.contains(1_299));
        assert!(!w.contains(1_300));
    }

    #[test]
    fn boundary_instant_opens_a_new_cycle() {
        let w = CycleWindow::containing(604_800, at(604_800)).unwrap();
        assert_eq!(w.current_start_secs().unwrap(), 604_800);
    }

    #[test]
    fn pre_epoch_window_is_an_error_not_zero() {
        let w = CycleWindow {
            cycle_duration_secs: 100,
            current_cycle_start_date: DateTime::from_timestamp(-200, 0).unwrap(),
            next_cycle_start_date: DateTime::from_timestamp(-100, 0).unwrap(),
        };
        assert!(matches!(w.current_start_secs(), Err(EstimateError::InvalidInput(_))));
        assert!(w.next_start_secs().is_err());
        assert!(!w.contains(0));
    }

    #[test]
    fn zero_length_cycles_are_rejected() {
        assert!(CycleWindow::containing(0, at(10)).is_err());
    }
}
