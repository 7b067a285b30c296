//! Flow Sensor Constants

use crate::time::Millis;

/// Pulses closer together than this are contact bounce (milliseconds).
///
/// Source: OpenSprinkler firmware, flow_poll
pub const PULSE_DEBOUNCE_MS: Millis = 50;

/// Pulses within this window after a dry valve opens are ignored for rate
/// measurement (milliseconds).
///
/// Air and priming water produce bursts that are not representative flow.
pub const FLOW_WARMUP_MS: Millis = 90_000;

/// Real-time flow sampling window (seconds).
///
/// Source: OpenSprinkler firmware, FLOWCOUNT_RT_WINDOW
pub const FLOW_RT_WINDOW_S: u64 = 30;

/// Pulse rate scale: volume = pulses * rate / 100.
pub const PULSE_RATE_SCALE: f32 = 100.0;
