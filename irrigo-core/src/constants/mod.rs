//! Constants for Irrigo Core
//!
//! Every interval, threshold and sentinel the control core relies on lives
//! here, grouped by domain:
//! - **Time**: housekeeping intervals, timeouts and clock plausibility
//! - **Flow**: pulse debounce, warm-up filter and real-time sampling window
//! - **Limits**: station counts, queue capacity and network escalation
//! - **Program**: built-in program durations and weather scaling floors
//!
//! Values marked with a source keep wire and field compatibility with
//! existing controllers; changing them changes observable behavior.

/// Housekeeping intervals, timeouts and clock plausibility.
pub mod time;

/// Flow sensor pulse handling.
pub mod flow;

/// Capacity limits and failure escalation thresholds.
pub mod limits;

/// Built-in program parameters.
pub mod program;

pub use flow::{FLOW_RT_WINDOW_S, FLOW_WARMUP_MS, PULSE_DEBOUNCE_MS};
pub use limits::{MAX_PROGRAMS, MAX_STATIONS, RUNTIME_QUEUE_SIZE};
pub use time::{
    CHECK_NETWORK_INTERVAL_S, CHECK_WEATHER_INTERVAL_S, NTP_SYNC_INTERVAL_S, PING_TIMEOUT_MS,
    PLAUSIBLE_EPOCH_S, WEATHER_SUCCESS_TIMEOUT_S,
};
