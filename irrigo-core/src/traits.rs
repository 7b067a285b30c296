//! Collaborator interfaces
//!
//! The control core owns no hardware. Everything it touches goes through
//! one of these traits; a board implements all of them and is handed to
//! the [`Controller`](crate::Controller) as a single [`Board`].
//!
//! Only the ping reply is polled (`nb`); all other calls are expected to
//! finish quickly or fail.

use crate::errors::{NetError, StorageError, WeatherError};
use crate::events::{Event, LogRecord};
use crate::options::{MasterId, MasterRule, SensorType, StationFlags};
use crate::time::{Clock, Timestamp};
use crate::StationId;

/// A stored watering program
pub trait Program {
    /// Whether the program starts at the minute containing `t`
    fn matches(&self, t: Timestamp) -> bool;

    /// Raw (unresolved) duration for a station; 0 means the station is
    /// not part of the program
    fn duration(&self, sid: StationId) -> u16;

    /// Whether the global watering percentage applies
    fn use_weather(&self) -> bool;
}

/// Read access to the program catalog
pub trait ProgramCatalog {
    /// Program representation returned by [`read_program`](Self::read_program)
    type Program: Program;

    /// Number of stored programs
    fn program_count(&self) -> usize;

    /// Program by zero-based index
    fn read_program(&self, index: usize) -> Option<Self::Program>;

    /// Resolve a raw duration to seconds; special values depend on
    /// sunrise and sunset
    fn resolve_duration(&self, raw: u16) -> u64;
}

/// Controller options
pub trait OptionStore {
    /// Configured stations
    fn station_count(&self) -> usize;

    /// Global watering percentage
    fn water_percentage(&self) -> u8;

    /// Store a new watering percentage (weather adjustment)
    fn set_water_percentage(&mut self, pct: u8);

    /// Delay between sequential runs (seconds, may be negative)
    fn station_delay(&self) -> i32;

    /// Master valve assignment, if configured
    fn master(&self, which: MasterId) -> Option<MasterRule>;

    fn sensor_type(&self) -> SensorType;

    /// Hundredths of a volume unit per flow pulse
    fn pulse_rate(&self) -> u16;

    /// Running as a remote extension of another controller
    fn remote_extension(&self) -> bool;

    fn logging_enabled(&self) -> bool;

    fn ntp_enabled(&self) -> bool;

    /// Master enable switch
    fn controller_enabled(&self) -> bool;

    /// End of the current rain delay (0 or past means none)
    fn rain_delay_stop(&self) -> Timestamp;

    fn station_flags(&self, sid: StationId) -> StationFlags;

    /// Whether `sid` is wired to either master valve
    fn is_master(&self, sid: StationId) -> bool {
        MasterId::ALL
            .iter()
            .any(|&m| self.master(m).map(|r| r.station) == Some(sid))
    }
}

/// Station output shift register
pub trait StationDriver {
    /// Set a station's commanded bit (not yet applied)
    fn set_bit(&mut self, sid: StationId, on: bool);

    /// Commanded bit of a station
    fn bit(&self, sid: StationId) -> bool;

    /// Push all commanded bits to hardware
    fn apply_all(&mut self);

    /// Clear every commanded bit
    fn clear_all(&mut self);
}

/// Consumer of controller notifications
pub trait EventSink {
    fn emit(&mut self, event: Event, at: Timestamp);
}

/// Persistent log of completed runs and sensor episodes
pub trait Logger {
    fn write(&mut self, record: &LogRecord) -> Result<(), StorageError>;
}

/// Network link
pub trait NetworkLink {
    /// Send a ping to the gateway
    fn send_ping(&mut self) -> Result<(), NetError>;

    /// Poll for the ping reply
    fn poll_ping_reply(&mut self) -> nb::Result<(), NetError>;

    /// Tear down and re-establish the link
    fn reconnect(&mut self) -> Result<(), NetError>;

    /// Fetch the current local time from NTP
    fn fetch_ntp_time(&mut self) -> Result<Timestamp, NetError>;
}

/// Result of a weather refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WeatherReport {
    /// New watering percentage, when the service computed one
    pub water_percentage: Option<u8>,
    /// External IP seen by the service (IPv4, big-endian)
    pub external_ip: Option<u32>,
}

/// Remote weather service
pub trait WeatherService {
    fn refresh(&mut self, now: Timestamp) -> Result<WeatherReport, WeatherError>;
}

/// Digital inputs
pub trait SensorInputs {
    /// Debounced rain sensor state
    fn rain_sensed(&mut self) -> bool;

    /// Whether the front-panel program switch was pressed since the last call
    fn program_switch_pressed(&mut self, now: Timestamp) -> bool;
}

/// System-level control
pub trait SystemControl {
    /// Restart the controller
    fn reboot(&mut self);
}

/// Everything the controller needs from a board
pub trait Board:
    ProgramCatalog
    + OptionStore
    + StationDriver
    + EventSink
    + Logger
    + Clock
    + NetworkLink
    + WeatherService
    + SensorInputs
    + SystemControl
{
}

impl<T> Board for T where
    T: ProgramCatalog
        + OptionStore
        + StationDriver
        + EventSink
        + Logger
        + Clock
        + NetworkLink
        + WeatherService
        + SensorInputs
        + SystemControl
{
}
