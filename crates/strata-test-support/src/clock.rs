//! Deterministic `Clock` for tests.

use chrono::{DateTime, TimeZone, Utc};
use strata_core::clock::Clock;

/// A clock that always returns a fixed point in time.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A `FixedClock` pinned to 2026-01-15 10:00:00 UTC.
///
/// # Panics
///
/// Never in practice; the instant is a valid calendar time.
#[must_use]
pub fn fixed_clock() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap())
}
