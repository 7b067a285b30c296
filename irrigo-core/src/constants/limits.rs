//! Capacity Limits

/// Highest number of addressable stations (25 boards of 8).
pub const MAX_STATIONS: usize = 200;

/// Default run queue capacity: one run per station.
pub const RUNTIME_QUEUE_SIZE: usize = MAX_STATIONS;

/// Largest program catalog kept by [`crate::ProgramStore`].
pub const MAX_PROGRAMS: usize = 40;

/// Fixed start times per program.
pub const MAX_START_TIMES: usize = 4;

/// Program name length.
pub const PROGRAM_NAME_LEN: usize = 32;

// ===== NETWORK ESCALATION =====

/// Consecutive ping failures are clamped here; reaching it requests a
/// deferred reboot.
pub const NETWORK_MAX_FAILURES: u8 = 6;

/// Above this many consecutive failures (and below the max) the link is
/// reconnected.
pub const NETWORK_RECONNECT_AFTER: u8 = 2;
