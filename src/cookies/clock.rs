//! Cookie creation-time clock.
//!
//! Creation time is the tie-breaker in cookie ordering, so two cookies must
//! never share one. The clock samples wall time in milliseconds and, when
//! the millisecond has not advanced since the last stamp, hands out the
//! previous stamp plus one nanosecond instead of sampling again.

use std::sync::{Arc, Mutex};
use time::OffsetDateTime;

/// Source of wall-clock time, in milliseconds since the Unix epoch.
pub trait WallClock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// `WallClock` backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_millis(&self) -> i64 {
        (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
    }
}

#[derive(Debug, Default)]
struct ClockState {
    last_millis: i64,
    last_nanos: i128,
}

/// Strictly increasing timestamp source for cookie creation times.
pub struct CookieClock {
    wall: Arc<dyn WallClock>,
    state: Mutex<ClockState>,
}

impl std::fmt::Debug for CookieClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieClock").finish_non_exhaustive()
    }
}

impl Default for CookieClock {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl CookieClock {
    pub fn new(wall: Arc<dyn WallClock>) -> Self {
        Self {
            wall,
            state: Mutex::new(ClockState::default()),
        }
    }

    /// Next creation stamp. Never equal to, or earlier than, a previous one.
    pub fn stamp(&self) -> OffsetDateTime {
        let millis = self.wall.now_millis();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let candidate = millis as i128 * 1_000_000;
        if millis > state.last_millis && candidate > state.last_nanos {
            state.last_millis = millis;
            state.last_nanos = candidate;
        } else {
            state.last_nanos += 1;
        }

        OffsetDateTime::from_unix_timestamp_nanos(state.last_nanos)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }

    /// Current wall time, for expiry checks.
    pub fn now(&self) -> OffsetDateTime {
        let millis = self.wall.now_millis() as i128;
        OffsetDateTime::from_unix_timestamp_nanos(millis * 1_000_000)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct FixedClock(AtomicI64);

    impl WallClock for FixedClock {
        fn now_millis(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_same_millisecond_still_increases() {
        let wall = Arc::new(FixedClock(AtomicI64::new(1_700_000_000_000)));
        let clock = CookieClock::new(wall);
        let a = clock.stamp();
        let b = clock.stamp();
        let c = clock.stamp();
        assert!(a < b && b < c);
        assert_eq!((b - a).whole_nanoseconds(), 1);
    }

    #[test]
    fn test_advancing_wall_clock_resyncs() {
        let wall = Arc::new(FixedClock(AtomicI64::new(1_700_000_000_000)));
        let clock = CookieClock::new(wall.clone());
        let a = clock.stamp();
        wall.0.store(1_700_000_000_005, Ordering::SeqCst);
        let b = clock.stamp();
        assert_eq!((b - a).whole_milliseconds(), 5);
    }

    #[test]
    fn test_wall_clock_going_backwards() {
        let wall = Arc::new(FixedClock(AtomicI64::new(1_700_000_000_000)));
        let clock = CookieClock::new(wall.clone());
        let a = clock.stamp();
        wall.0.store(1_699_999_999_000, Ordering::SeqCst);
        let b = clock.stamp();
        assert!(b > a);
    }

    #[test]
    fn test_system_clock_monotonic_stamps() {
        let clock = CookieClock::default();
        let stamps: Vec<_> = (0..1000).map(|_| clock.stamp()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }
}
