//! Built-in Program Parameters

/// Per-station duration of the test program (seconds).
pub const TEST_PROGRAM_DURATION_S: u64 = 60;

/// Per-station duration of the short test program (seconds).
pub const SHORT_TEST_DURATION_S: u64 = 2;

/// Below this watering percentage short runs are dropped entirely.
pub const LOW_WATER_PERCENT: u8 = 20;

/// Scaled durations below this are dropped when the watering percentage is
/// below [`LOW_WATER_PERCENT`] (seconds).
pub const MIN_SCALED_DURATION_S: u64 = 10;

/// Raw duration meaning "sunrise to sunset".
pub const DURATION_SUNRISE_TO_SUNSET: u16 = 65_534;

/// Raw duration meaning "sunset to next sunrise".
pub const DURATION_SUNSET_TO_SUNRISE: u16 = 65_535;
