//! Notifications and log records produced by the controller
//!
//! ## Overview
//!
//! The tick engine reports two kinds of output:
//!
//! ```text
//!             ┌──────────────┐
//!  tick ────▶ │  Controller  │ ──▶ Event      ──▶ EventSink (notifications)
//!             └──────────────┘ ──▶ LogRecord  ──▶ Logger    (history)
//! ```
//!
//! - [`Event`]s are fire-and-forget: the sink decides whether and where to
//!   deliver them and may drop any of them.
//! - [`LogRecord`]s describe completed activity (a run, a rain episode) and
//!   are only written when logging is enabled. Write failures are ignored.
//!
//! Both are small `Copy` values; nothing here allocates.
//!
//! ## Volumes
//!
//! Runs accumulate volume in raw flow pulses. Reports convert to volume
//! units with the configured pulse rate: `volume = pulses * rate / 100`.

use crate::queue::ProgramId;
use crate::time::Timestamp;
use crate::StationId;

/// One station run as reported in notifications
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RunReport {
    /// Station that ran
    pub station: StationId,
    /// Program that queued the run
    pub program: ProgramId,
    /// Scheduled (or actual) start
    pub start: Timestamp,
    /// Planned duration for schedule/open, actual for close (seconds)
    pub duration: u64,
    /// Watering percentage the run was scaled with
    pub water_level: u8,
    /// Volume delivered so far (volume units)
    pub volume: f32,
}

impl RunReport {
    /// Average flow over the run (volume units per minute)
    pub fn flow_rate(&self) -> f32 {
        if self.duration == 0 {
            0.0
        } else {
            self.volume * 60.0 / self.duration as f32
        }
    }
}

/// One program invocation as reported in notifications
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProgramReport {
    /// Program that was invoked
    pub program: ProgramId,
    /// Earliest scheduled start among the invocation's runs
    pub start: Timestamp,
    /// Latest scheduled end among the invocation's runs
    pub end: Timestamp,
    /// Watering percentage applied to the durations
    pub water_level: u8,
    /// Total volume delivered (volume units)
    pub volume: f32,
}

/// Controller notification
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Program invocation received its schedule
    ProgramSchedule(ProgramReport),
    /// First station of an invocation opened
    ProgramStart(ProgramReport),
    /// Last station of an invocation closed
    ProgramStop(ProgramReport),
    /// Run received its start time
    StationSchedule(RunReport),
    /// Station opened
    StationOpen(RunReport),
    /// Station closed after running
    StationClose(RunReport),
    /// Rain delay began
    RainDelayStart {
        /// Remaining delay (seconds)
        duration: u64,
    },
    /// Rain delay ended
    RainDelayStop {
        /// How long the delay lasted (seconds)
        duration: u64,
    },
    /// Rain sensor became wet
    RainSensorOn,
    /// Rain sensor dried
    RainSensorOff {
        /// How long rain was sensed (seconds)
        duration: u64,
    },
    /// Real-time flow sample
    FlowUpdate {
        /// Volume over the window (volume units)
        volume: f32,
        /// Window length (seconds)
        duration: u64,
    },
    /// Weather service call completed
    WeatherCall {
        /// Whether the service answered
        success: bool,
    },
    /// Watering percentage after a weather call
    WaterLevel {
        /// New percentage
        percent: u8,
    },
    /// External IP reported by the weather service
    IpUpdate {
        /// IPv4 address, big-endian
        ip: u32,
    },
    /// First tick after boot
    RebootComplete,
}

/// Event discriminant, used for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum EventKind {
    ProgramSchedule,
    ProgramStart,
    ProgramStop,
    StationSchedule,
    StationOpen,
    StationClose,
    RainDelayStart,
    RainDelayStop,
    RainSensorOn,
    RainSensorOff,
    FlowUpdate,
    WeatherCall,
    WaterLevel,
    IpUpdate,
    RebootComplete,
}

impl EventKind {
    /// Machine-readable name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ProgramSchedule => "program_schedule",
            Self::ProgramStart => "program_start",
            Self::ProgramStop => "program_stop",
            Self::StationSchedule => "station_schedule",
            Self::StationOpen => "station_open",
            Self::StationClose => "station_close",
            Self::RainDelayStart => "raindelay_start",
            Self::RainDelayStop => "raindelay_stop",
            Self::RainSensorOn => "rainsensor_on",
            Self::RainSensorOff => "rainsensor_off",
            Self::FlowUpdate => "flow_update",
            Self::WeatherCall => "weather_call",
            Self::WaterLevel => "water_level",
            Self::IpUpdate => "ip_update",
            Self::RebootComplete => "reboot_complete",
        }
    }
}

impl Event {
    /// Payload-free kind of the event
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::ProgramSchedule(_) => EventKind::ProgramSchedule,
            Self::ProgramStart(_) => EventKind::ProgramStart,
            Self::ProgramStop(_) => EventKind::ProgramStop,
            Self::StationSchedule(_) => EventKind::StationSchedule,
            Self::StationOpen(_) => EventKind::StationOpen,
            Self::StationClose(_) => EventKind::StationClose,
            Self::RainDelayStart { .. } => EventKind::RainDelayStart,
            Self::RainDelayStop { .. } => EventKind::RainDelayStop,
            Self::RainSensorOn => EventKind::RainSensorOn,
            Self::RainSensorOff { .. } => EventKind::RainSensorOff,
            Self::FlowUpdate { .. } => EventKind::FlowUpdate,
            Self::WeatherCall { .. } => EventKind::WeatherCall,
            Self::WaterLevel { .. } => EventKind::WaterLevel,
            Self::IpUpdate { .. } => EventKind::IpUpdate,
            Self::RebootComplete => EventKind::RebootComplete,
        }
    }

    /// Station the event concerns, if any
    pub const fn station(&self) -> Option<StationId> {
        match self {
            Self::StationSchedule(r) | Self::StationOpen(r) | Self::StationClose(r) => {
                Some(r.station)
            }
            _ => None,
        }
    }
}

/// Log record discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum LogKind {
    /// Station run
    Station = 0,
    /// Rain sensor episode
    RainSensor = 1,
    /// Rain delay episode
    RainDelay = 2,
    /// Watering percentage change
    WaterLevel = 3,
    /// Pulse count over a running period
    FlowSense = 4,
}

impl LogKind {
    /// Short lowercase name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Station => "station",
            Self::RainSensor => "rs",
            Self::RainDelay => "rd",
            Self::WaterLevel => "wl",
            Self::FlowSense => "fl",
        }
    }
}

/// Persistent log record
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LogRecord {
    /// A station run finished or was cut short
    Station {
        /// Program that queued the run
        program: ProgramId,
        /// Station that ran
        station: StationId,
        /// Actual run time (seconds)
        duration: u64,
        /// When the station closed
        end: Timestamp,
        /// Measured flow rate when a flow sensor is fitted
        gpm: Option<f32>,
    },
    /// Rain sensor released
    RainSensor {
        /// How long rain was sensed (seconds)
        duration: u64,
        /// When the sensor dried
        end: Timestamp,
    },
    /// Rain delay ended
    RainDelay {
        /// How long the delay lasted (seconds)
        duration: u64,
        /// When it ended
        end: Timestamp,
    },
    /// Weather call changed the watering percentage
    WaterLevel {
        /// New percentage
        percent: u8,
        /// When it changed
        at: Timestamp,
    },
    /// Pulses counted while the controller was running
    FlowSense {
        /// Pulses counted
        pulses: u32,
        /// Counting period (seconds)
        duration: u64,
        /// When the controller went idle
        end: Timestamp,
    },
}

impl LogRecord {
    /// Kind of the record
    pub const fn kind(&self) -> LogKind {
        match self {
            Self::Station { .. } => LogKind::Station,
            Self::RainSensor { .. } => LogKind::RainSensor,
            Self::RainDelay { .. } => LogKind::RainDelay,
            Self::WaterLevel { .. } => LogKind::WaterLevel,
            Self::FlowSense { .. } => LogKind::FlowSense,
        }
    }

    /// When the record was produced
    pub const fn time(&self) -> Timestamp {
        match self {
            Self::Station { end, .. }
            | Self::RainSensor { end, .. }
            | Self::RainDelay { end, .. }
            | Self::FlowSense { end, .. } => *end,
            Self::WaterLevel { at, .. } => *at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_names() {
        assert_eq!(Event::RebootComplete.kind().name(), "reboot_complete");
        assert_eq!(
            Event::RainDelayStop { duration: 5 }.kind(),
            EventKind::RainDelayStop
        );
    }

    #[test]
    fn test_flow_rate() {
        let report = RunReport {
            station: 2,
            program: ProgramId::Manual,
            start: 0,
            duration: 120,
            water_level: 100,
            volume: 10.0,
        };
        assert!((report.flow_rate() - 5.0).abs() < 1e-6);
        assert_eq!(Event::StationOpen(report).station(), Some(2));

        let idle = RunReport { duration: 0, ..report };
        assert_eq!(idle.flow_rate(), 0.0);
    }

    #[test]
    fn test_log_record_time() {
        let rec = LogRecord::WaterLevel { percent: 80, at: 42 };
        assert_eq!(rec.time(), 42);
        assert_eq!(rec.kind().name(), "wl");
    }

    #[test]
    fn test_event_stays_small() {
        assert!(core::mem::size_of::<Event>() <= 48);
    }
}
