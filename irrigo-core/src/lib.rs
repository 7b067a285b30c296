//! Control core for Irrigo irrigation controllers
//!
//! Decides which stations (valves) open, for how long, in what order and
//! under which preemption conditions. Designed to run unattended for months
//! on a resource-constrained board.
//!
//! Key constraints:
//! - No heap allocation: the run queue is a fixed-capacity arena
//! - One preemptive interrupt source (flow pulses), everything else runs in
//!   a cooperative one-second tick
//! - Every reboot is deferred until the controller is idle
//!
//! ```no_run
//! use irrigo_core::{Controller, FlowMeter, Board};
//!
//! static FLOW: FlowMeter = FlowMeter::new();
//!
//! fn main_loop<B: Board>(board: B) -> ! {
//!     let mut controller: Controller<'_, B> = Controller::new(board, &FLOW);
//!     loop {
//!         controller.poll();
//!     }
//! }
//!
//! // Wired to the flow sensor pin
//! fn on_flow_pulse(now_ms: u32) {
//!     FLOW.on_pulse(now_ms);
//! }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

#[macro_use]
mod logging;

pub mod constants;
pub mod controller;
pub mod errors;
pub mod events;
pub mod flow;
pub mod network;
pub mod options;
pub mod program;
pub mod queue;
pub mod scheduler;
pub mod time;
pub mod traits;
pub mod weather;

#[cfg(feature = "host")]
pub mod host;

// Public API
pub use controller::{Controller, ControllerState, ControllerStatus, LastRun};
pub use errors::{ControllerError, NetError, QueueError, StorageError, WeatherError};
pub use events::{Event, EventKind, LogKind, LogRecord, ProgramReport, RunReport};
pub use flow::{FlowMeter, FlowSnapshot};
pub use options::{MasterId, MasterRule, Options, SensorType, StationFlags};
pub use program::{ProgramData, ProgramStore, SunTimes};
pub use queue::{ProgramId, ProgramRunStats, RuntimeQueue, ScheduledRun};
pub use scheduler::Scheduler;
pub use time::{Clock, Millis, Timestamp};
pub use traits::{
    Board, EventSink, Logger, NetworkLink, OptionStore, Program, ProgramCatalog, SensorInputs,
    StationDriver, SystemControl, WeatherReport, WeatherService,
};

/// Station identifier (zero-based)
pub type StationId = u8;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
