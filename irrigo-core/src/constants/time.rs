//! Time-Related Constants
//!
//! All controller time is local epoch seconds; only the flow meter and the
//! ping wait use the free-running millisecond counter.

use crate::time::{Millis, Timestamp};

// ===== TIME UNIT CONVERSIONS =====

/// Seconds per minute.
pub const SECONDS_PER_MINUTE: u64 = 60;

/// Minutes per day.
pub const MINUTES_PER_DAY: u16 = 1440;

/// Seconds per day.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Milliseconds per minute.
pub const MS_PER_MINUTE: u32 = 60_000;

// ===== HOUSEKEEPING INTERVALS =====

/// NTP re-sync interval (seconds).
///
/// Slightly off a whole day so the sync drifts across the clock instead of
/// always landing on the same minute as a program start.
///
/// Source: OpenSprinkler firmware, NTP_SYNC_INTERVAL
pub const NTP_SYNC_INTERVAL_S: u64 = 86_403;

/// Gateway ping interval (seconds).
///
/// Source: OpenSprinkler firmware, CHECK_NETWORK_INTERVAL
pub const CHECK_NETWORK_INTERVAL_S: u64 = 601;

/// Weather refresh interval (seconds).
///
/// Source: OpenSprinkler firmware, CHECK_WEATHER_TIMEOUT
pub const CHECK_WEATHER_INTERVAL_S: u64 = 3_601;

/// Maximum time without a successful weather call before a reboot is
/// requested (seconds).
///
/// Source: OpenSprinkler firmware, CHECK_WEATHER_SUCCESS_TIMEOUT
pub const WEATHER_SUCCESS_TIMEOUT_S: u64 = 86_433;

/// How far ahead a deferred reboot looks for a program start (seconds).
pub const REBOOT_LOOKAHEAD_S: u64 = 60;

/// Minimum time a rain sensor must have been wet before its release is
/// logged (seconds).
pub const RAIN_SENSOR_OFF_DEBOUNCE_S: u64 = 10;

// ===== TIMEOUTS =====

/// Wait for a gateway ping reply (milliseconds).
///
/// Source: OpenSprinkler firmware, PING_TIMEOUT
pub const PING_TIMEOUT_MS: Millis = 200;

/// Host runner yield per loop iteration (milliseconds).
pub const HOST_LOOP_YIELD_MS: u64 = 1;

// ===== CLOCK PLAUSIBILITY =====

/// Any clock at or below this value has never been set (2001-01-01).
///
/// A successful NTP sync that lifts the clock across this line means every
/// timer was armed against garbage; the controller restarts once idle.
pub const PLAUSIBLE_EPOCH_S: Timestamp = 978_307_200;
