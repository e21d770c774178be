//! Time source for the session.
//!
//! Every coordinate conversion and every guide-pulse deadline reads the time
//! through [`Clock`], so tests can freeze or step it with [`FakeClock`].

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

pub trait Clock {
    /// Current UTC instant.
    fn now(&self) -> DateTime<Utc>;

    /// Julian Day of [`now`](Self::now).
    fn julian_day(&self) -> f64 {
        sky_math::julian_day(self.now())
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually stepped clock.
///
/// Clones share the same instant, so a test can keep one handle while the
/// session owns another.
#[derive(Debug, Clone)]
pub struct FakeClock {
    now: Rc<Cell<DateTime<Utc>>>,
}

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let step = TimeDelta::milliseconds(i64::try_from(by.as_millis()).unwrap_or(i64::MAX));
        self.now.set(self.now.get() + step);
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        self.now.set(instant);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;

    #[test]
    fn test_fake_clock_shared_between_clones() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let clock = FakeClock::new(start);
        let other = clock.clone();

        clock.advance(Duration::from_millis(1500));
        assert_eq!(other.now(), start + TimeDelta::milliseconds(1500));
    }

    #[test]
    fn test_julian_day_of_j2000() {
        let clock = FakeClock::new(Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap());
        assert_abs_diff_eq!(clock.julian_day(), sky_math::J2000, epsilon = 1e-9);
    }
}
