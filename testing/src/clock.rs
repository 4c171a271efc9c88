//! A deterministic [`Clock`] for tests.

use chrono::{DateTime, Utc};
use iamcore_core::environment::Clock;

/// Always returns the same time, so event timestamps and TTL expiry are
/// reproducible across test runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Build a clock fixed at `time`.
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// A [`FixedClock`] fixed at `2025-01-01T00:00:00Z`, for tests that don't
/// care which instant is used, only that it's stable.
///
/// # Panics
///
/// Never, in practice: the hardcoded timestamp is a compile-time constant
/// known to parse.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_clock() -> FixedClock {
    FixedClock::new(
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp always parses")
            .with_timezone(&Utc),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_always_returns_the_same_instant() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }
}
