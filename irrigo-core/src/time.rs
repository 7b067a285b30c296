//! Time management for the controller
//!
//! Two clocks matter:
//! - Local wall time in epoch seconds, the basis of all scheduling. It can
//!   jump when NTP corrects it.
//! - A free-running millisecond counter that wraps roughly every 49 days.
//!   Only differences are meaningful, always taken with wrapping arithmetic.

use core::cell::Cell;

use crate::constants::time::{PLAUSIBLE_EPOCH_S, SECONDS_PER_DAY, SECONDS_PER_MINUTE};

/// Local time in seconds since the epoch
pub type Timestamp = u64;

/// Free-running millisecond counter
pub type Millis = u32;

/// Time source for the controller
pub trait Clock {
    /// Current local time
    fn now(&self) -> Timestamp;

    /// Current millisecond counter
    fn millis(&self) -> Millis;

    /// Correct the wall clock
    fn set_time(&mut self, t: Timestamp);

    /// Store the corrected time in the battery-backed RTC, if fitted
    fn set_rtc(&mut self, t: Timestamp);
}

/// Milliseconds elapsed since `then`, tolerant of counter wrap
#[inline]
pub const fn elapsed_ms(now: Millis, then: Millis) -> Millis {
    now.wrapping_sub(then)
}

/// Minute index since the epoch
#[inline]
pub const fn minute_index(t: Timestamp) -> u64 {
    t / SECONDS_PER_MINUTE
}

/// Minute of the local day (0..1440)
#[inline]
pub const fn minute_of_day(t: Timestamp) -> u16 {
    ((t % SECONDS_PER_DAY) / SECONDS_PER_MINUTE) as u16
}

/// Day index since the epoch
#[inline]
pub const fn day_index(t: Timestamp) -> u64 {
    t / SECONDS_PER_DAY
}

/// Whether the clock looks like it has ever been set
#[inline]
pub const fn is_plausible(t: Timestamp) -> bool {
    t > PLAUSIBLE_EPOCH_S
}

/// Fixed clock for testing
///
/// Every `millis()` read advances the counter by `millis_step`, so code that
/// busy-waits on the counter always terminates.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Timestamp,
    millis: Cell<Millis>,
    millis_step: Millis,
    rtc: Option<Timestamp>,
}

impl FixedClock {
    /// Clock frozen at `now`
    pub fn new(now: Timestamp) -> Self {
        Self {
            now,
            millis: Cell::new(0),
            millis_step: 1,
            rtc: None,
        }
    }

    /// Milliseconds added per `millis()` read
    pub fn with_millis_step(mut self, step: Millis) -> Self {
        self.millis_step = step;
        self
    }

    /// Jump to `now`
    pub fn set(&mut self, now: Timestamp) {
        self.now = now;
    }

    /// Move forward
    pub fn advance(&mut self, secs: u64) {
        self.now += secs;
    }

    /// Set the next `millis()` reading
    pub fn set_millis(&self, ms: Millis) {
        self.millis.set(ms);
    }

    /// Last value written to the RTC
    pub fn rtc(&self) -> Option<Timestamp> {
        self.rtc
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.now
    }

    fn millis(&self) -> Millis {
        let ms = self.millis.get();
        self.millis.set(ms.wrapping_add(self.millis_step));
        ms
    }

    fn set_time(&mut self, t: Timestamp) {
        self.now = t;
    }

    fn set_rtc(&mut self, t: Timestamp) {
        self.rtc = Some(t);
    }
}

/// System clock (requires std)
///
/// Wall time is the OS clock shifted by a fixed UTC offset plus whatever
/// correction `set_time` applied.
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct SystemClock {
    utc_offset_s: i64,
    correction_s: i64,
    boot: std::time::Instant,
}

#[cfg(feature = "std")]
impl SystemClock {
    /// OS clock shifted by `utc_offset_s`
    pub fn new(utc_offset_s: i64) -> Self {
        Self {
            utc_offset_s,
            correction_s: 0,
            boot: std::time::Instant::now(),
        }
    }

    fn os_local(&self) -> i64 {
        use std::time::{SystemTime, UNIX_EPOCH};

        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        secs + self.utc_offset_s
    }
}

#[cfg(feature = "std")]
impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        (self.os_local() + self.correction_s).max(0) as Timestamp
    }

    fn millis(&self) -> Millis {
        // Truncation gives the wrapping counter
        self.boot.elapsed().as_millis() as Millis
    }

    fn set_time(&mut self, t: Timestamp) {
        self.correction_s = t as i64 - self.os_local();
    }

    fn set_rtc(&mut self, _t: Timestamp) {
        // The OS owns the hardware clock
    }
}
