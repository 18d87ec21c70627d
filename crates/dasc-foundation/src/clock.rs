use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

/// Abstracts calendar time so day-boundary and "skip today's directory"
/// logic can be driven deterministically in tests.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall-clock time via [`chrono::Utc::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl Clock for RealClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock whose value is set and advanced explicitly, for engine and
/// boundary-classification tests.
#[derive(Debug, Clone)]
pub struct TestClock {
    inner: Arc<Mutex<DateTime<Utc>>>,
}

impl TestClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.inner.lock().unwrap() = at;
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.inner.lock().unwrap();
        *guard += delta;
    }
}

impl Clock for TestClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.inner.lock().unwrap()
    }
}

/// Shared handle to a [`Clock`], cloneable across worker threads.
pub type SharedClock = Arc<dyn Clock>;

pub fn real_clock() -> SharedClock {
    Arc::new(RealClock)
}

pub fn test_clock(start: DateTime<Utc>) -> (SharedClock, TestClock) {
    let clock = TestClock::new(start);
    (Arc::new(clock.clone()), clock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_clock_advances() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let (shared, handle) = test_clock(start);
        assert_eq!(shared.now_utc(), start);
        handle.advance(chrono::Duration::seconds(30));
        assert_eq!(shared.now_utc(), start + chrono::Duration::seconds(30));
    }

    #[test]
    fn real_clock_is_close_to_now() {
        let clock = RealClock;
        let delta = Utc::now() - clock.now_utc();
        assert!(delta.num_seconds().abs() < 2);
    }
}
