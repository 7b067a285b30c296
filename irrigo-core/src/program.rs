//! Stored watering programs
//!
//! ## Overview
//!
//! A program says *when* to water (day pattern plus start times) and *how
//! long* each station runs. [`ProgramData`] answers "does this program start
//! at minute `t`?" and [`ProgramStore`] is an in-memory catalog that also
//! resolves sun-relative durations.
//!
//! ## Day Patterns
//!
//! | Pattern  | Matches when                                       |
//! |----------|----------------------------------------------------|
//! | Weekly   | weekday bit set (bit 0 = Monday .. bit 6 = Sunday) |
//! | BiWeekly | always (reserved)                                  |
//! | Monthly  | day of month equals the configured day             |
//! | Interval | `(t / 86400) % every == remainder`                 |
//!
//! An odd/even restriction applies on top. "Odd" also skips the 31st and
//! February 29th so two odd days never follow each other.
//!
//! ## Start Times
//!
//! Either up to four fixed start times, or one start repeated `repeat` more
//! times every `interval` minutes. Repeats carry over midnight: a program
//! that matched yesterday's day pattern can still fire early today.
//!
//! Start times may be relative to sunrise or sunset. Sunrise-relative times
//! clamp at midnight, sunset-relative at 23:59.

use chrono::{DateTime, Datelike};
use heapless::{String, Vec};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::constants::limits::{MAX_START_TIMES, PROGRAM_NAME_LEN};
use crate::constants::program::{DURATION_SUNRISE_TO_SUNSET, DURATION_SUNSET_TO_SUNRISE};
use crate::constants::time::{MINUTES_PER_DAY, SECONDS_PER_DAY, SECONDS_PER_MINUTE};
use crate::constants::{MAX_PROGRAMS, MAX_STATIONS};
use crate::time::{day_index, minute_of_day, Timestamp};
use crate::traits::{Program, ProgramCatalog};
use crate::StationId;

/// Sunrise and sunset, minutes after local midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SunTimes {
    /// Sunrise (minutes)
    pub sunrise: u16,
    /// Sunset (minutes)
    pub sunset: u16,
}

impl Default for SunTimes {
    fn default() -> Self {
        // 06:00 and 18:00
        Self {
            sunrise: 360,
            sunset: 1080,
        }
    }
}

/// Which days a program runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DayPattern {
    /// Selected weekdays
    Weekly {
        /// Bitmask, bit 0 = Monday
        days: u8,
    },
    /// Reserved; matches every day
    BiWeekly,
    /// One day of the month
    Monthly {
        /// Day of month (1..=31)
        day: u8,
    },
    /// Every `every` days, on epoch days with the given remainder
    Interval {
        /// Period (days)
        every: u8,
        /// Epoch day remainder that matches
        remainder: u8,
    },
}

/// Odd/even day restriction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OddEven {
    /// Every day
    #[default]
    Any,
    /// Odd days of the month only
    Odd,
    /// Even days of the month only
    Even,
}

/// One start time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StartTime {
    /// Never starts
    #[default]
    Disabled,
    /// Minute of day
    At(u16),
    /// Offset from sunrise (minutes)
    Sunrise(i16),
    /// Offset from sunset (minutes)
    Sunset(i16),
}

impl StartTime {
    const DISABLED_BIT: u16 = 1 << 15;
    const SUNRISE_BIT: u16 = 1 << 14;
    const SUNSET_BIT: u16 = 1 << 13;
    const SIGN_BIT: u16 = 1 << 12;
    const OFFSET_MASK: u16 = 0x7ff;

    /// Decode the packed 16-bit form used by stored programs
    pub const fn from_raw(raw: u16) -> Self {
        if raw & Self::DISABLED_BIT != 0 {
            return Self::Disabled;
        }
        let mut offset = (raw & Self::OFFSET_MASK) as i16;
        if raw & Self::SIGN_BIT != 0 {
            offset = -offset;
        }
        if raw & Self::SUNRISE_BIT != 0 {
            Self::Sunrise(offset)
        } else if raw & Self::SUNSET_BIT != 0 {
            Self::Sunset(offset)
        } else {
            Self::At(raw & Self::OFFSET_MASK)
        }
    }

    /// Minute of day, or `None` when disabled
    pub fn minute(&self, sun: SunTimes) -> Option<u16> {
        let last = (MINUTES_PER_DAY - 1) as i32;
        match *self {
            Self::Disabled => None,
            Self::At(m) => Some(m),
            Self::Sunrise(offset) => Some((sun.sunrise as i32 + offset as i32).clamp(0, last) as u16),
            Self::Sunset(offset) => Some((sun.sunset as i32 + offset as i32).clamp(0, last) as u16),
        }
    }
}

/// When a program starts within a matching day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StartTimes {
    /// Up to four independent start times
    Fixed([StartTime; MAX_START_TIMES]),
    /// `start`, then `repeat` more times every `interval` minutes
    Repeating {
        /// First start of the day
        start: StartTime,
        /// Additional starts
        repeat: u16,
        /// Minutes between starts
        interval: u16,
    },
}

/// A stored program
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProgramData {
    /// Display name, truncated to fit
    pub name: String<PROGRAM_NAME_LEN>,
    /// Disabled programs never match
    pub enabled: bool,
    /// Scale durations by the watering percentage
    pub use_weather: bool,
    /// Day selection
    pub days: DayPattern,
    /// Odd or even day restriction
    pub odd_even: OddEven,
    /// Start times for a matching day
    pub start_times: StartTimes,
    /// Raw durations by station; missing entries are 0
    pub durations: Vec<u16, MAX_STATIONS>,
    #[cfg_attr(feature = "serde", serde(skip))]
    sun: SunTimes,
}

impl ProgramData {
    /// Enabled program running every day at `minute`
    pub fn daily(name: &str, minute: u16) -> Self {
        let mut fixed = [StartTime::Disabled; MAX_START_TIMES];
        fixed[0] = StartTime::At(minute);
        let mut label = String::new();
        for c in name.chars() {
            if label.push(c).is_err() {
                break;
            }
        }
        Self {
            name: label,
            enabled: true,
            use_weather: false,
            days: DayPattern::Weekly { days: 0x7f },
            odd_even: OddEven::Any,
            start_times: StartTimes::Fixed(fixed),
            durations: Vec::new(),
            sun: SunTimes::default(),
        }
    }

    /// Set the day pattern
    pub fn with_days(mut self, days: DayPattern) -> Self {
        self.days = days;
        self
    }

    /// Set the odd/even restriction
    pub fn with_odd_even(mut self, odd_even: OddEven) -> Self {
        self.odd_even = odd_even;
        self
    }

    /// Set the start times
    pub fn with_start_times(mut self, start_times: StartTimes) -> Self {
        self.start_times = start_times;
        self
    }

    /// Scale by the watering percentage
    pub fn with_weather(mut self, use_weather: bool) -> Self {
        self.use_weather = use_weather;
        self
    }

    /// Enable or disable
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set a station's raw duration; stations past the limit are ignored
    pub fn with_duration(mut self, sid: StationId, raw: u16) -> Self {
        let idx = sid as usize;
        while self.durations.len() <= idx {
            if self.durations.push(0).is_err() {
                return self;
            }
        }
        self.durations[idx] = raw;
        self
    }

    /// Sun times used to resolve relative start times
    pub fn with_sun(mut self, sun: SunTimes) -> Self {
        self.sun = sun;
        self
    }

    /// Whether the day containing `t` satisfies the day pattern and the
    /// odd/even restriction
    pub fn day_matches(&self, t: Timestamp) -> bool {
        let Some(date) = DateTime::from_timestamp(t as i64, 0) else {
            return false;
        };
        let weekday = date.weekday().num_days_from_monday();
        let day = date.day();

        let pattern_ok = match self.days {
            DayPattern::Weekly { days } => days & (1 << weekday) != 0,
            DayPattern::BiWeekly => true,
            DayPattern::Monthly { day: d } => day == (d & 0x1f) as u32,
            DayPattern::Interval { every, remainder } => {
                every != 0 && day_index(t) % every as u64 == remainder as u64
            }
        };
        if !pattern_ok {
            return false;
        }

        match self.odd_even {
            OddEven::Any => true,
            OddEven::Even => day % 2 == 0,
            OddEven::Odd => day != 31 && !(day == 29 && date.month() == 2) && day % 2 == 1,
        }
    }

    /// Whether the program starts at the minute containing `t`
    pub fn matches_at(&self, t: Timestamp) -> bool {
        if !self.enabled {
            return false;
        }
        let minute = minute_of_day(t);

        match self.start_times {
            StartTimes::Fixed(times) => {
                self.day_matches(t)
                    && times.iter().any(|s| s.minute(self.sun) == Some(minute))
            }
            StartTimes::Repeating {
                start,
                repeat,
                interval,
            } => {
                let Some(first) = start.minute(self.sun) else {
                    return false;
                };
                if self.day_matches(t) && repeat_hits(minute, first, repeat, interval) {
                    return true;
                }
                // Repeats from yesterday running past midnight
                interval != 0
                    && t >= SECONDS_PER_DAY
                    && self.day_matches(t - SECONDS_PER_DAY)
                    && repeat_hits(minute + MINUTES_PER_DAY, first, repeat, interval)
            }
        }
    }
}

fn repeat_hits(minute: u16, first: u16, repeat: u16, interval: u16) -> bool {
    if minute == first {
        return true;
    }
    if minute < first || interval == 0 {
        return false;
    }
    let since = minute - first;
    since % interval == 0 && since / interval <= repeat
}

impl Program for ProgramData {
    fn matches(&self, t: Timestamp) -> bool {
        self.matches_at(t)
    }

    fn duration(&self, sid: StationId) -> u16 {
        self.durations.get(sid as usize).copied().unwrap_or(0)
    }

    fn use_weather(&self) -> bool {
        self.use_weather
    }
}

/// In-memory program catalog
#[derive(Debug, Clone, Default)]
pub struct ProgramStore<const P: usize = MAX_PROGRAMS> {
    programs: Vec<ProgramData, P>,
    sun: SunTimes,
}

impl<const P: usize> ProgramStore<P> {
    /// Empty catalog with default sun times
    pub fn new() -> Self {
        Self {
            programs: Vec::new(),
            sun: SunTimes::default(),
        }
    }

    /// Append a program; hands it back when the catalog is full
    pub fn add(&mut self, program: ProgramData) -> Result<usize, ProgramData> {
        self.programs.push(program)?;
        Ok(self.programs.len() - 1)
    }

    /// Replace the program at `index`
    pub fn replace(&mut self, index: usize, program: ProgramData) -> Option<ProgramData> {
        let slot = self.programs.get_mut(index)?;
        Some(core::mem::replace(slot, program))
    }

    /// Remove the program at `index`, shifting later ones down
    pub fn remove(&mut self, index: usize) -> Option<ProgramData> {
        (index < self.programs.len()).then(|| self.programs.remove(index))
    }

    /// Program at `index`
    pub fn get(&self, index: usize) -> Option<&ProgramData> {
        self.programs.get(index)
    }

    /// Sun times used to resolve durations and start times
    pub fn sun_times(&self) -> SunTimes {
        self.sun
    }

    /// Update sun times
    pub fn set_sun_times(&mut self, sun: SunTimes) {
        self.sun = sun;
    }
}

impl<const P: usize> ProgramCatalog for ProgramStore<P> {
    type Program = ProgramData;

    fn program_count(&self) -> usize {
        self.programs.len()
    }

    fn read_program(&self, index: usize) -> Option<ProgramData> {
        self.programs.get(index).map(|p| p.clone().with_sun(self.sun))
    }

    fn resolve_duration(&self, raw: u16) -> u64 {
        let sunrise = self.sun.sunrise as u64;
        let sunset = self.sun.sunset as u64;
        match raw {
            DURATION_SUNRISE_TO_SUNSET => sunset.saturating_sub(sunrise) * SECONDS_PER_MINUTE,
            DURATION_SUNSET_TO_SUNRISE => {
                (sunrise + MINUTES_PER_DAY as u64).saturating_sub(sunset) * SECONDS_PER_MINUTE
            }
            seconds => seconds as u64,
        }
    }
}
