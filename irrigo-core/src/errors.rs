//! Error Types for the Control Core
//!
//! ## Design
//!
//! All errors are small `Copy` values with `&'static str` reasons only, so
//! they can be returned from the tick without touching the heap.
//!
//! ## Error Categories
//!
//! ### Queue
//! - `QueueFull`: enqueue refused, the run is dropped and counted
//! - `AlreadyScheduled`: a run's start time is assigned exactly once
//!
//! ### Collaborators
//! - `NetError`: ping, reconnect and NTP failures reported by the board
//! - `StorageError`: log record writes
//! - `WeatherError`: weather refresh
//!
//! None of these are fatal. The tick engine logs them and carries on;
//! repeated network or weather failures escalate into a deferred reboot
//! rather than an error return.
//!
//! ```rust
//! use irrigo_core::{QueueError, RuntimeQueue, ScheduledRun, ProgramId};
//!
//! let mut queue: RuntimeQueue<1> = RuntimeQueue::new();
//! queue.enqueue(ScheduledRun::new(0, ProgramId::Manual, 100, 60, 100)).unwrap();
//! match queue.enqueue(ScheduledRun::new(1, ProgramId::Manual, 100, 60, 100)) {
//!     Err(QueueError::QueueFull { capacity }) => assert_eq!(capacity, 1),
//!     _ => unreachable!(),
//! }
//! ```

use thiserror_no_std::Error;

use crate::StationId;

/// Run queue errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// No free slot left
    #[error("Runtime queue full ({capacity} runs)")]
    QueueFull {
        /// Queue capacity
        capacity: usize,
    },

    /// Start time already assigned
    #[error("Run in slot {slot} is already scheduled")]
    AlreadyScheduled {
        /// Offending slot
        slot: usize,
    },

    /// Slot holds no run
    #[error("Slot {slot} is empty")]
    EmptySlot {
        /// Offending slot
        slot: usize,
    },

    /// Station outside the indexable range
    #[error("Station {station} out of range")]
    InvalidStation {
        /// Offending station
        station: StationId,
    },

    /// Zero marks a run as unscheduled and cannot be used as a start time
    #[error("Start time 0 is reserved")]
    ReservedStart,
}

/// Network collaborator errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    /// No reply within the allowed window
    #[error("Network timeout")]
    Timeout,

    /// Link is down or the gateway cannot be resolved
    #[error("Network unreachable")]
    Unreachable,

    /// NTP server returned nothing usable
    #[error("Time sync failed: {reason}")]
    TimeSync {
        /// What went wrong
        reason: &'static str,
    },

    /// Driver-level failure
    #[error("Link error: {reason}")]
    Link {
        /// What went wrong
        reason: &'static str,
    },
}

/// Log storage errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Storage not mounted or not present
    #[error("Log storage unavailable")]
    Unavailable,

    /// Write rejected
    #[error("Log write failed: {reason}")]
    WriteFailed {
        /// What went wrong
        reason: &'static str,
    },
}

/// Weather service errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherError {
    /// Service could not be reached
    #[error("Weather service unreachable")]
    Unreachable,

    /// Service replied with something we could not use
    #[error("Bad weather response: {reason}")]
    BadResponse {
        /// What went wrong
        reason: &'static str,
    },
}

/// Errors surfaced by controller operations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerError {
    /// Queue operation failed
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Requested program does not exist in the catalog
    #[error("Unknown program {pid}")]
    UnknownProgram {
        /// Requested program number
        pid: u8,
    },

    /// Network operation failed
    #[error("Network error: {0}")]
    Network(#[from] NetError),

    /// Log write failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Weather refresh failed
    #[error("Weather error: {0}")]
    Weather(#[from] WeatherError),
}

#[cfg(feature = "defmt")]
impl defmt::Format for QueueError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::QueueFull { capacity } => defmt::write!(fmt, "Queue full ({})", capacity),
            Self::AlreadyScheduled { slot } => defmt::write!(fmt, "Slot {} already scheduled", slot),
            Self::EmptySlot { slot } => defmt::write!(fmt, "Slot {} empty", slot),
            Self::InvalidStation { station } => defmt::write!(fmt, "Station {} out of range", station),
            Self::ReservedStart => defmt::write!(fmt, "Start 0 reserved"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for NetError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Timeout => defmt::write!(fmt, "Network timeout"),
            Self::Unreachable => defmt::write!(fmt, "Network unreachable"),
            Self::TimeSync { reason } => defmt::write!(fmt, "Time sync: {}", reason),
            Self::Link { reason } => defmt::write!(fmt, "Link: {}", reason),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for StorageError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Unavailable => defmt::write!(fmt, "Storage unavailable"),
            Self::WriteFailed { reason } => defmt::write!(fmt, "Write failed: {}", reason),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for WeatherError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Unreachable => defmt::write!(fmt, "Weather unreachable"),
            Self::BadResponse { reason } => defmt::write!(fmt, "Weather: {}", reason),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ControllerError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Queue(e) => defmt::write!(fmt, "Queue: {}", e),
            Self::UnknownProgram { pid } => defmt::write!(fmt, "Unknown program {}", pid),
            Self::Network(e) => defmt::write!(fmt, "Network: {}", e),
            Self::Storage(e) => defmt::write!(fmt, "Storage: {}", e),
            Self::Weather(e) => defmt::write!(fmt, "Weather: {}", e),
        }
    }
}
