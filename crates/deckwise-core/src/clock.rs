//! Wall clock and day-boundary arithmetic.
//!
//! The scheduler never reads the system time directly. Everything goes
//! through a [`Clock`], and day numbers are derived from the collection's
//! creation time by [`SchedTimes`].

use std::cell::Cell;
use std::rc::Rc;

use chrono::{DateTime, Utc};

pub const SECS_PER_DAY: i64 = 86_400;

/// Source of the current time in milliseconds since the Unix epoch.
pub trait Clock {
    fn now_millis(&self) -> i64;

    fn now_secs(&self) -> i64 {
        self.now_millis().div_euclid(1000)
    }
}

/// Reads the host clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for tests and simulations.
///
/// Clones share the same instant, so a test can keep one handle and
/// advance time under a scheduler that owns another.
#[derive(Debug, Clone)]
pub struct MockClock {
    millis: Rc<Cell<i64>>,
}

impl MockClock {
    pub fn at_secs(secs: i64) -> Self {
        Self {
            millis: Rc::new(Cell::new(secs * 1000)),
        }
    }

    pub fn set_secs(&self, secs: i64) {
        self.millis.set(secs * 1000);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.millis.set(self.millis.get() + secs * 1000);
    }

    pub fn advance_days(&self, days: i64) {
        self.advance_secs(days * SECS_PER_DAY);
    }
}

impl Clock for MockClock {
    fn now_millis(&self) -> i64 {
        self.millis.get()
    }
}

/// A consistent reading of "now" for one scheduling operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedTimes {
    pub now_millis: i64,
    /// Unix seconds.
    pub now: i64,
    /// Days elapsed since the collection's first day boundary.
    pub today: i32,
    /// Unix seconds at which `today` ends.
    pub day_cutoff: i64,
}

impl SchedTimes {
    pub fn compute(now_millis: i64, crt: i64, rollover_hour: u8) -> Self {
        let start = collection_start(crt, rollover_hour);
        let now = now_millis.div_euclid(1000);
        let today = (now - start).div_euclid(SECS_PER_DAY);
        Self {
            now_millis,
            now,
            today: today as i32,
            day_cutoff: start + (today + 1) * SECS_PER_DAY,
        }
    }

    pub fn read(clock: &impl Clock, crt: i64, rollover_hour: u8) -> Self {
        Self::compute(clock.now_millis(), crt, rollover_hour)
    }
}

/// First day boundary at or before `crt`: its UTC date at `rollover_hour`,
/// moved a day back when `crt` falls before the rollover.
fn collection_start(crt: i64, rollover_hour: u8) -> i64 {
    let Some(created) = DateTime::<Utc>::from_timestamp(crt, 0) else {
        return crt;
    };
    let boundary = created
        .date_naive()
        .and_hms_opt(u32::from(rollover_hour.min(23)), 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(crt);
    if boundary > crt {
        boundary - SECS_PER_DAY
    } else {
        boundary
    }
}
