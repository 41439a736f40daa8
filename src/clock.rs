//! Clock Monitor (spec.md §4.2).
//!
//! An offline token is only as trustworthy as the clock that checks its
//! `exp`. If the wall clock regresses past tolerance versus the
//! last-persisted observation, every offline decision for the rest of the
//! process's lifetime must refuse, regardless of signature validity — until
//! `reset()` clears the tamper flag along with the rest of the session.
//!
//! `last_seen` is stored in **milliseconds** since the Unix epoch (see
//! SPEC_FULL.md §7, Open Question 1).

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Default tolerance for backwards clock jumps: 5 minutes.
pub const DEFAULT_SKEW_TOLERANCE_MS: i64 = 5 * 60 * 1000;

#[derive(Debug)]
pub struct ClockMonitor {
    last_seen_ms: AtomicI64,
    tampered: AtomicBool,
    skew_tolerance_ms: i64,
}

/// Outcome of a single `observe` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockObservation {
    Ok,
    Tamper,
}

impl ClockMonitor {
    pub fn new(skew_tolerance_ms: i64, initial_last_seen_ms: i64) -> Self {
        Self {
            last_seen_ms: AtomicI64::new(initial_last_seen_ms),
            tampered: AtomicBool::new(false),
            skew_tolerance_ms,
        }
    }

    pub fn with_default_tolerance(initial_last_seen_ms: i64) -> Self {
        Self::new(DEFAULT_SKEW_TOLERANCE_MS, initial_last_seen_ms)
    }

    /// Observe `now`. If it regresses more than `skew_tolerance` behind the
    /// last-seen timestamp, latches the tamper flag and returns `Tamper`
    /// without advancing `last_seen`. Otherwise advances `last_seen` to
    /// `max(last_seen, now)` and returns `Ok`.
    pub fn observe(&self, now: DateTime<Utc>) -> ClockObservation {
        let now_ms = now.timestamp_millis();
        let last_seen = self.last_seen_ms.load(Ordering::SeqCst);

        if now_ms < last_seen - self.skew_tolerance_ms {
            self.tampered.store(true, Ordering::SeqCst);
            return ClockObservation::Tamper;
        }

        if now_ms > last_seen {
            // Best-effort CAS loop; losing a race just means another
            // observer already advanced last_seen at least as far.
            let _ = self.last_seen_ms.compare_exchange(
                last_seen,
                now_ms,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }

        ClockObservation::Ok
    }

    /// Raise the high-water mark to `max(last_seen, ms)` without running the
    /// tamper check — used once at startup to restore the persisted value
    /// from the Cache before any live `observe()` call, so a clock rolled
    /// back while the process was not running is still caught on the first
    /// observation after restart instead of silently re-basing on `now`.
    pub fn seed(&self, ms: i64) {
        let mut current = self.last_seen_ms.load(Ordering::SeqCst);
        while ms > current {
            match self.last_seen_ms.compare_exchange(
                current,
                ms,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn is_tampered(&self) -> bool {
        self.tampered.load(Ordering::SeqCst)
    }

    pub fn last_seen_ms(&self) -> i64 {
        self.last_seen_ms.load(Ordering::SeqCst)
    }

    /// Clear the tamper flag. Only `reset()` on the coordinator should call
    /// this; a fresh session starts clean.
    pub fn clear_tamper(&self) {
        self.tampered.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn monotonic_advance() {
        let base = Utc::now();
        let monitor = ClockMonitor::with_default_tolerance(base.timestamp_millis());

        assert_eq!(monitor.observe(base + Duration::seconds(1)), ClockObservation::Ok);
        assert_eq!(monitor.observe(base + Duration::seconds(2)), ClockObservation::Ok);
        assert!(!monitor.is_tampered());
        assert_eq!(monitor.last_seen_ms(), (base + Duration::seconds(2)).timestamp_millis());
    }

    #[test]
    fn small_regression_within_tolerance_is_ok() {
        let base = Utc::now();
        let monitor = ClockMonitor::with_default_tolerance(base.timestamp_millis());
        monitor.observe(base);

        // 1 second backwards is well within the 5-minute default tolerance.
        let result = monitor.observe(base - Duration::seconds(1));
        assert_eq!(result, ClockObservation::Ok);
        assert!(!monitor.is_tampered());
    }

    #[test]
    fn large_regression_flags_tamper() {
        let base = Utc::now();
        let monitor = ClockMonitor::with_default_tolerance(base.timestamp_millis());
        monitor.observe(base);

        let result = monitor.observe(base - Duration::hours(1));
        assert_eq!(result, ClockObservation::Tamper);
        assert!(monitor.is_tampered());
    }

    #[test]
    fn tamper_flag_is_sticky_until_cleared() {
        let base = Utc::now();
        let monitor = ClockMonitor::with_default_tolerance(base.timestamp_millis());
        monitor.observe(base - Duration::hours(1));
        assert!(monitor.is_tampered());

        // A subsequent, perfectly fine observation doesn't clear it.
        monitor.observe(base);
        assert!(monitor.is_tampered());

        monitor.clear_tamper();
        assert!(!monitor.is_tampered());
    }

    #[test]
    fn seed_restores_persisted_high_water_mark_across_restart() {
        let base = Utc::now();
        // Simulates a fresh process constructed with `now` already rolled
        // back relative to what was last persisted.
        let monitor = ClockMonitor::with_default_tolerance((base - Duration::hours(2)).timestamp_millis());
        monitor.seed(base.timestamp_millis());

        // The next observation, using the same rolled-back wall clock that
        // caused the restart, must now be flagged rather than silently
        // accepted as a fresh baseline.
        let result = monitor.observe(base - Duration::hours(2));
        assert_eq!(result, ClockObservation::Tamper);
    }

    #[test]
    fn seed_never_moves_last_seen_backwards() {
        let base = Utc::now();
        let monitor = ClockMonitor::with_default_tolerance(base.timestamp_millis());
        monitor.seed((base - Duration::hours(1)).timestamp_millis());
        assert_eq!(monitor.last_seen_ms(), base.timestamp_millis());
    }

    #[test]
    fn does_not_regress_last_seen_on_ok_observation() {
        let base = Utc::now();
        let monitor = ClockMonitor::with_default_tolerance(base.timestamp_millis());
        monitor.observe(base + Duration::seconds(10));
        let advanced = monitor.last_seen_ms();

        // Within tolerance but earlier than the high-water mark.
        monitor.observe(base + Duration::seconds(5));
        assert_eq!(monitor.last_seen_ms(), advanced);
    }
}
