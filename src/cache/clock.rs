//! Time source for expiry and access timestamps
//!
//! The store never reads the system clock directly, so expiry can be
//! exercised without sleeping.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;

/// Source of the current time
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Start at the current wall-clock time
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = now.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Milliseconds since the Unix epoch, as persisted in the database
pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// `ms + ttl`, clamped to the latest instant `from_millis` can represent
pub(crate) fn add_ttl(ms: i64, ttl: Duration) -> i64 {
    let max_ms = DateTime::<Utc>::MAX_UTC.timestamp_millis();
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    ms.saturating_add(ttl_ms).min(max_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance() {
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let clock = ManualClock::starting_at(start);

        clock.advance(Duration::from_secs(3601));
        assert_eq!((clock.now() - start).num_seconds(), 3601);
    }

    #[test]
    fn test_millis_roundtrip_truncates_to_millis() {
        let at = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let back = from_millis(to_millis(at));
        assert_eq!(back.timestamp_subsec_millis(), 123);
        assert_eq!(back.timestamp(), at.timestamp());
    }

    #[test]
    fn test_add_ttl_clamps_to_representable_time() {
        assert_eq!(add_ttl(1_000, Duration::from_secs(1)), 2_000);

        let max_ms = DateTime::<Utc>::MAX_UTC.timestamp_millis();
        assert_eq!(add_ttl(1_000, Duration::MAX), max_ms);
        assert_eq!(add_ttl(max_ms - 10, Duration::from_secs(1)), max_ms);
        assert!(from_millis(add_ttl(1_000, Duration::MAX)) > from_millis(1_000));
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let a = SystemClock.now();
        let b = SystemClock.now();
        assert!(b >= a);
    }
}
