//! Ghost policy and classifier.
//!
//! A vehicle is a "ghost" when its report can no longer be trusted as live:
//!
//! 1. **Stale**: `now - last_update_time > stale_after_seconds`. This overrides
//!    everything else.
//! 2. **Stationary**: not stale, but `speed < stationary_speed_threshold`.
//!
//! Otherwise the vehicle is live. Both rules are pure functions of the record,
//! `now`, and the policy.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::vehicle::VehiclePosition;

/// Thresholds driving classification and the periodic sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GhostPolicy {
    /// Seconds of silence after which a vehicle is stale.
    pub stale_after_seconds: i64,
    /// Speeds strictly below this (km/h) count as stationary.
    pub stationary_speed_threshold: f64,
    /// Interval between sweep ticks.
    pub sweep_interval_seconds: u64,
}

impl Default for GhostPolicy {
    fn default() -> Self {
        Self {
            stale_after_seconds: 120,
            stationary_speed_threshold: 1.0,
            sweep_interval_seconds: 3,
        }
    }
}

impl GhostPolicy {
    /// Validates the policy.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for non-positive intervals or a
    /// negative / non-finite speed threshold.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stale_after_seconds <= 0 {
            return Err(ValidationError::InvalidConfig {
                field: "stale_after_seconds".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if !self.stationary_speed_threshold.is_finite() || self.stationary_speed_threshold < 0.0 {
            return Err(ValidationError::InvalidConfig {
                field: "stationary_speed_threshold".to_string(),
                reason: "must be a finite, non-negative speed".to_string(),
            });
        }
        if self.sweep_interval_seconds == 0 {
            return Err(ValidationError::InvalidConfig {
                field: "sweep_interval_seconds".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Why a record was classified as a ghost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GhostReason {
    /// No update for longer than `stale_after_seconds`.
    Stale,
    /// Reporting, but below the stationary speed threshold.
    Stationary,
}

/// Evaluates `record` against `policy` at time `now`.
///
/// Returns `None` for a live vehicle.
#[must_use]
pub fn evaluate(record: &VehiclePosition, now: i64, policy: &GhostPolicy) -> Option<GhostReason> {
    let age = now.saturating_sub(record.last_update_time);
    if age > policy.stale_after_seconds {
        return Some(GhostReason::Stale);
    }
    if record.speed < policy.stationary_speed_threshold {
        return Some(GhostReason::Stationary);
    }
    None
}

/// Ghost verdict for `record` at time `now`.
///
/// ```
/// use ghostbus::{classify, GhostPolicy, PositionUpdate, VehiclePosition};
///
/// let record = VehiclePosition::from_update(&PositionUpdate::new("B1", 12.9, 77.6, 30.0, 1_000));
/// let policy = GhostPolicy::default();
/// assert!(!classify(&record, 1_005, &policy));
/// assert!(classify(&record, 1_121, &policy));
/// ```
#[must_use]
pub fn classify(record: &VehiclePosition, now: i64, policy: &GhostPolicy) -> bool {
    evaluate(record, now, policy).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::PositionUpdate;

    use proptest::prelude::*;

    fn record(speed: f64, ts: i64) -> VehiclePosition {
        VehiclePosition::from_update(&PositionUpdate::new("B1", 12.9, 77.6, speed, ts))
    }

    #[test]
    fn moving_and_fresh_is_live() {
        let p = GhostPolicy::default();
        assert_eq!(evaluate(&record(30.0, 1000), 1000, &p), None);
        assert_eq!(evaluate(&record(1.0, 1000), 1120, &p), None);
    }

    #[test]
    fn stale_boundary_is_strict() {
        let p = GhostPolicy::default();
        assert!(!classify(&record(30.0, 1000), 1120, &p));
        assert_eq!(evaluate(&record(30.0, 1000), 1121, &p), Some(GhostReason::Stale));
    }

    #[test]
    fn stale_overrides_stationary() {
        let p = GhostPolicy::default();
        assert_eq!(evaluate(&record(0.0, 1000), 2000, &p), Some(GhostReason::Stale));
    }

    #[test]
    fn stationary_below_threshold() {
        let p = GhostPolicy::default();
        assert_eq!(evaluate(&record(0.0, 1000), 1005, &p), Some(GhostReason::Stationary));
        assert_eq!(evaluate(&record(0.99, 1000), 1005, &p), Some(GhostReason::Stationary));
    }

    #[test]
    fn future_timestamp_is_not_stale() {
        let p = GhostPolicy::default();
        assert_eq!(evaluate(&record(10.0, 5000), 1000, &p), None);
    }

    #[test]
    fn extreme_times_do_not_overflow() {
        let p = GhostPolicy::default();
        assert!(classify(&record(10.0, i64::MIN), i64::MAX, &p));
        assert!(!classify(&record(10.0, i64::MAX), i64::MIN, &p));
    }

    #[test]
    fn policy_validation() {
        assert!(GhostPolicy::default().validate().is_ok());

        let p = GhostPolicy { stale_after_seconds: 0, ..GhostPolicy::default() };
        assert_eq!(p.validate().unwrap_err().field(), "stale_after_seconds");

        let p = GhostPolicy { stationary_speed_threshold: f64::NAN, ..GhostPolicy::default() };
        assert_eq!(p.validate().unwrap_err().field(), "stationary_speed_threshold");

        let p = GhostPolicy { sweep_interval_seconds: 0, ..GhostPolicy::default() };
        assert_eq!(p.validate().unwrap_err().field(), "sweep_interval_seconds");
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let p: GhostPolicy = serde_json::from_str(r#"{"stale_after_seconds": 60}"#).unwrap();
        assert_eq!(p.stale_after_seconds, 60);
        assert_eq!(p.stationary_speed_threshold, 1.0);
        assert_eq!(p.sweep_interval_seconds, 3);
    }

    proptest! {
        #[test]
        fn stale_always_wins(
            speed in 0.0f64..500.0,
            ts in 0i64..1_000_000,
            extra in 1i64..1_000_000,
            stale_after in 1i64..10_000,
        ) {
            let p = GhostPolicy { stale_after_seconds: stale_after, ..GhostPolicy::default() };
            let now = ts + stale_after + extra;
            prop_assert!(classify(&record(speed, ts), now, &p));
            prop_assert_eq!(evaluate(&record(speed, ts), now, &p), Some(GhostReason::Stale));
        }

        #[test]
        fn fresh_verdict_follows_speed(
            speed in 0.0f64..500.0,
            threshold in 0.0f64..100.0,
            ts in 0i64..1_000_000,
            age in 0i64..=120,
        ) {
            let p = GhostPolicy { stationary_speed_threshold: threshold, ..GhostPolicy::default() };
            let verdict = classify(&record(speed, ts), ts + age, &p);
            prop_assert_eq!(verdict, speed < threshold);
        }

        #[test]
        fn classify_is_deterministic(speed in 0.0f64..100.0, ts in 0i64..10_000, now in 0i64..20_000) {
            let p = GhostPolicy::default();
            let r = record(speed, ts);
            prop_assert_eq!(classify(&r, now, &p), classify(&r, now, &p));
        }
    }
}
