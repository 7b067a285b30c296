//! Controller options
//!
//! [`Options`] is the plain in-memory option set: global switches, the two
//! master valves and a per-station attribute byte. Boards that persist
//! options elsewhere can implement [`OptionStore`] directly instead.

use heapless::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::constants::MAX_STATIONS;
use crate::time::Timestamp;
use crate::traits::OptionStore;
use crate::StationId;

/// Attached sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SensorType {
    /// Nothing wired
    #[default]
    None = 0,
    /// Rain switch
    Rain = 1,
    /// Pulse flow meter
    Flow = 2,
}

impl SensorType {
    /// Short lowercase name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Rain => "rain",
            Self::Flow => "flow",
        }
    }
}

/// One of the two master valves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MasterId {
    /// First master
    One,
    /// Second master
    Two,
}

impl MasterId {
    /// Both masters, in evaluation order
    pub const ALL: [MasterId; 2] = [MasterId::One, MasterId::Two];
}

/// Master valve assignment
///
/// The master opens `on_adjust` seconds relative to the start of any
/// bound station run and closes `off_adjust` seconds relative to its end.
/// Negative values are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MasterRule {
    /// Station wired to the master valve
    pub station: StationId,
    /// Open offset from run start (seconds)
    pub on_adjust: i32,
    /// Close offset from run end (seconds)
    pub off_adjust: i32,
}

impl MasterRule {
    /// Master on `station` with no adjustments
    pub const fn new(station: StationId) -> Self {
        Self {
            station,
            on_adjust: 0,
            off_adjust: 0,
        }
    }

    /// Open and close offsets (seconds) relative to each run
    pub const fn with_adjustments(mut self, on_adjust: i32, off_adjust: i32) -> Self {
        self.on_adjust = on_adjust;
        self.off_adjust = off_adjust;
        self
    }
}

/// Per-station attribute flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StationFlags(pub u8);

impl StationFlags {
    /// No attributes
    pub const NONE: Self = Self(0);
    /// Station never runs
    pub const DISABLED: Self = Self(1 << 0);
    /// Runs one after another with other sequential stations
    pub const SEQUENTIAL: Self = Self(1 << 1);
    /// Keeps running through rain delay and rain sensor
    pub const IGNORE_RAIN: Self = Self(1 << 2);
    /// Bound to master one
    pub const MASTER_ONE: Self = Self(1 << 3);
    /// Bound to master two
    pub const MASTER_TWO: Self = Self(1 << 4);

    /// Whether every bit of `other` is set
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Both sets of bits
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Station is disabled
    pub const fn is_disabled(&self) -> bool {
        self.contains(Self::DISABLED)
    }

    /// Station runs sequentially
    pub const fn is_sequential(&self) -> bool {
        self.contains(Self::SEQUENTIAL)
    }

    /// Station keeps running in rain
    pub const fn ignores_rain(&self) -> bool {
        self.contains(Self::IGNORE_RAIN)
    }

    /// Whether the station drives the given master
    pub const fn uses_master(&self, which: MasterId) -> bool {
        match which {
            MasterId::One => self.contains(Self::MASTER_ONE),
            MasterId::Two => self.contains(Self::MASTER_TWO),
        }
    }
}

impl core::ops::BitOr for StationFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// In-memory option set
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Options {
    /// Configured stations (multiple of 8 on real hardware)
    pub station_count: u8,
    /// Global watering percentage
    pub water_percentage: u8,
    /// Delay inserted between sequential runs (seconds, may be negative)
    pub station_delay: i16,
    /// Master valve one
    pub master_one: Option<MasterRule>,
    /// Master valve two
    pub master_two: Option<MasterRule>,
    /// Sensor wired to the sensor input
    pub sensor_type: SensorType,
    /// Hundredths of a volume unit per flow pulse
    pub pulse_rate: u16,
    /// Controller is a remote extension of another controller
    pub remote_extension: bool,
    /// Write run and sensor logs
    pub logging_enabled: bool,
    /// Sync the clock over NTP
    pub ntp_enabled: bool,
    /// Master switch; when off all scheduled programs stop
    pub controller_enabled: bool,
    /// Rain delay end (0 when none)
    pub rain_delay_stop: Timestamp,
    stations: Vec<StationFlags, MAX_STATIONS>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            station_count: 8,
            water_percentage: 100,
            station_delay: 0,
            master_one: None,
            master_two: None,
            sensor_type: SensorType::None,
            pulse_rate: 100,
            remote_extension: false,
            logging_enabled: true,
            ntp_enabled: true,
            controller_enabled: true,
            rain_delay_stop: 0,
            stations: Vec::new(),
        }
    }
}

impl Options {
    /// Defaults: 8 stations, 100 %, no masters, no sensor
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the station count
    pub fn with_station_count(mut self, count: u8) -> Self {
        self.station_count = count;
        self
    }

    /// Set the global watering percentage
    pub fn with_water_percentage(mut self, pct: u8) -> Self {
        self.water_percentage = pct;
        self
    }

    /// Set the delay between sequential runs (seconds)
    pub fn with_station_delay(mut self, delay_s: i16) -> Self {
        self.station_delay = delay_s;
        self
    }

    /// Assign a master valve
    pub fn with_master(mut self, which: MasterId, rule: MasterRule) -> Self {
        match which {
            MasterId::One => self.master_one = Some(rule),
            MasterId::Two => self.master_two = Some(rule),
        }
        self
    }

    /// Set the sensor type
    pub fn with_sensor(mut self, sensor: SensorType) -> Self {
        self.sensor_type = sensor;
        self
    }

    /// Set the flow pulse rate (hundredths of a unit per pulse)
    pub fn with_pulse_rate(mut self, rate: u16) -> Self {
        self.pulse_rate = rate;
        self
    }

    /// Set a station's attribute flags
    ///
    /// Stations past [`MAX_STATIONS`] are ignored.
    pub fn with_station(mut self, sid: StationId, flags: StationFlags) -> Self {
        self.set_station_flags(sid, flags);
        self
    }

    /// Set a station's attribute flags in place
    pub fn set_station_flags(&mut self, sid: StationId, flags: StationFlags) {
        let idx = sid as usize;
        if idx >= MAX_STATIONS {
            return;
        }
        while self.stations.len() <= idx {
            if self.stations.push(StationFlags::NONE).is_err() {
                return;
            }
        }
        self.stations[idx] = flags;
    }
}

impl OptionStore for Options {
    fn station_count(&self) -> usize {
        (self.station_count as usize).min(MAX_STATIONS)
    }

    fn water_percentage(&self) -> u8 {
        self.water_percentage
    }

    fn set_water_percentage(&mut self, pct: u8) {
        self.water_percentage = pct;
    }

    fn station_delay(&self) -> i32 {
        self.station_delay as i32
    }

    fn master(&self, which: MasterId) -> Option<MasterRule> {
        match which {
            MasterId::One => self.master_one,
            MasterId::Two => self.master_two,
        }
    }

    fn sensor_type(&self) -> SensorType {
        self.sensor_type
    }

    fn pulse_rate(&self) -> u16 {
        self.pulse_rate
    }

    fn remote_extension(&self) -> bool {
        self.remote_extension
    }

    fn logging_enabled(&self) -> bool {
        self.logging_enabled
    }

    fn ntp_enabled(&self) -> bool {
        self.ntp_enabled
    }

    fn controller_enabled(&self) -> bool {
        self.controller_enabled
    }

    fn rain_delay_stop(&self) -> Timestamp {
        self.rain_delay_stop
    }

    fn station_flags(&self, sid: StationId) -> StationFlags {
        self.stations
            .get(sid as usize)
            .copied()
            .unwrap_or(StationFlags::NONE)
    }
}
