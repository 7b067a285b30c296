//! Shared harness for controller integration tests
//!
//! [`MockBoard`] implements every collaborator trait in memory: commanded
//! and applied station bits, recorded events and log records, a settable
//! clock, and scripted network and weather results.

#![allow(dead_code)]

use std::collections::VecDeque;

use irrigo_core::constants::MAX_STATIONS;
use irrigo_core::program::{ProgramData, ProgramStore};
use irrigo_core::time::FixedClock;
use irrigo_core::{
    Clock, Controller, Event, FlowMeter, EventKind, EventSink, LogKind, LogRecord, Logger, Millis,
    NetError, NetworkLink, OptionStore, Options, ProgramCatalog, SensorInputs, SensorType,
    StationDriver, StationFlags, StorageError, SystemControl, Timestamp, WeatherError,
    WeatherReport, WeatherService, MasterId, MasterRule,
};

/// 2024-01-01 00:00:00, a Monday
pub const MONDAY: Timestamp = 1_704_067_200;

/// 06:00 on [`MONDAY`]
pub const SIX_AM: Timestamp = MONDAY + 6 * 3600;

/// In-memory board
pub struct MockBoard {
    pub options: Options,
    pub programs: ProgramStore,
    pub clock: FixedClock,
    pub bits: [bool; MAX_STATIONS],
    pub applied: [bool; MAX_STATIONS],
    pub applies: u32,
    pub events: Vec<(Event, Timestamp)>,
    pub logs: Vec<LogRecord>,
    pub log_fails: bool,
    pub ping_ok: bool,
    pub pings: u32,
    pub reconnect_ok: bool,
    pub reconnects: u32,
    pub ntp: Result<Timestamp, NetError>,
    pub ntp_calls: u32,
    pub weather: VecDeque<Result<WeatherReport, WeatherError>>,
    pub weather_calls: u32,
    pub rain: bool,
    pub switch_pressed: bool,
    pub reboots: u32,
}

impl MockBoard {
    pub fn new(now: Timestamp) -> Self {
        Self {
            options: Options::new(),
            programs: ProgramStore::new(),
            clock: FixedClock::new(now),
            bits: [false; MAX_STATIONS],
            applied: [false; MAX_STATIONS],
            applies: 0,
            events: Vec::new(),
            logs: Vec::new(),
            log_fails: false,
            ping_ok: true,
            pings: 0,
            reconnect_ok: false,
            reconnects: 0,
            ntp: Err(NetError::Timeout),
            ntp_calls: 0,
            weather: VecDeque::new(),
            weather_calls: 0,
            rain: false,
            switch_pressed: false,
            reboots: 0,
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_program(mut self, program: ProgramData) -> Self {
        if self.programs.add(program).is_err() {
            panic!("program store full");
        }
        self
    }

    /// Events of one kind, with their timestamps
    pub fn events_of(&self, kind: EventKind) -> Vec<(Event, Timestamp)> {
        self.events
            .iter()
            .filter(|(e, _)| e.kind() == kind)
            .copied()
            .collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(e, _)| e.kind() == kind).count()
    }

    /// Station events of one kind for one station
    pub fn station_events(&self, kind: EventKind, sid: u8) -> Vec<(Event, Timestamp)> {
        self.events_of(kind)
            .into_iter()
            .filter(|(e, _)| e.station() == Some(sid))
            .collect()
    }

    pub fn logs_of(&self, kind: LogKind) -> Vec<LogRecord> {
        self.logs.iter().filter(|r| r.kind() == kind).copied().collect()
    }
}

impl ProgramCatalog for MockBoard {
    type Program = ProgramData;

    fn program_count(&self) -> usize {
        self.programs.program_count()
    }

    fn read_program(&self, index: usize) -> Option<ProgramData> {
        self.programs.read_program(index)
    }

    fn resolve_duration(&self, raw: u16) -> u64 {
        self.programs.resolve_duration(raw)
    }
}

impl OptionStore for MockBoard {
    fn station_count(&self) -> usize {
        self.options.station_count()
    }

    fn water_percentage(&self) -> u8 {
        self.options.water_percentage()
    }

    fn set_water_percentage(&mut self, pct: u8) {
        self.options.set_water_percentage(pct);
    }

    fn station_delay(&self) -> i32 {
        self.options.station_delay()
    }

    fn master(&self, which: MasterId) -> Option<MasterRule> {
        self.options.master(which)
    }

    fn sensor_type(&self) -> SensorType {
        self.options.sensor_type()
    }

    fn pulse_rate(&self) -> u16 {
        self.options.pulse_rate()
    }

    fn remote_extension(&self) -> bool {
        self.options.remote_extension()
    }

    fn logging_enabled(&self) -> bool {
        self.options.logging_enabled()
    }

    fn ntp_enabled(&self) -> bool {
        self.options.ntp_enabled()
    }

    fn controller_enabled(&self) -> bool {
        self.options.controller_enabled()
    }

    fn rain_delay_stop(&self) -> Timestamp {
        self.options.rain_delay_stop()
    }

    fn station_flags(&self, sid: u8) -> StationFlags {
        self.options.station_flags(sid)
    }
}

impl StationDriver for MockBoard {
    fn set_bit(&mut self, sid: u8, on: bool) {
        if let Some(bit) = self.bits.get_mut(sid as usize) {
            *bit = on;
        }
    }

    fn bit(&self, sid: u8) -> bool {
        self.bits.get(sid as usize).copied().unwrap_or(false)
    }

    fn apply_all(&mut self) {
        self.applied = self.bits;
        self.applies += 1;
    }

    fn clear_all(&mut self) {
        self.bits = [false; MAX_STATIONS];
    }
}

impl EventSink for MockBoard {
    fn emit(&mut self, event: Event, at: Timestamp) {
        self.events.push((event, at));
    }
}

impl Logger for MockBoard {
    fn write(&mut self, record: &LogRecord) -> Result<(), StorageError> {
        if self.log_fails {
            return Err(StorageError::Unavailable);
        }
        self.logs.push(*record);
        Ok(())
    }
}

impl Clock for MockBoard {
    fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn millis(&self) -> Millis {
        self.clock.millis()
    }

    fn set_time(&mut self, t: Timestamp) {
        self.clock.set_time(t);
    }

    fn set_rtc(&mut self, t: Timestamp) {
        self.clock.set_rtc(t);
    }
}

impl NetworkLink for MockBoard {
    fn send_ping(&mut self) -> Result<(), NetError> {
        self.pings += 1;
        Ok(())
    }

    fn poll_ping_reply(&mut self) -> nb::Result<(), NetError> {
        if self.ping_ok {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    fn reconnect(&mut self) -> Result<(), NetError> {
        self.reconnects += 1;
        if self.reconnect_ok {
            Ok(())
        } else {
            Err(NetError::Unreachable)
        }
    }

    fn fetch_ntp_time(&mut self) -> Result<Timestamp, NetError> {
        self.ntp_calls += 1;
        self.ntp
    }
}

impl WeatherService for MockBoard {
    fn refresh(&mut self, _now: Timestamp) -> Result<WeatherReport, WeatherError> {
        self.weather_calls += 1;
        self.weather.pop_front().unwrap_or(Ok(WeatherReport::default()))
    }
}

impl SensorInputs for MockBoard {
    fn rain_sensed(&mut self) -> bool {
        self.rain
    }

    fn program_switch_pressed(&mut self, _now: Timestamp) -> bool {
        core::mem::take(&mut self.switch_pressed)
    }
}

impl SystemControl for MockBoard {
    fn reboot(&mut self) {
        self.reboots += 1;
    }
}

/// Advance the clock one second at a time, polling after each step,
/// until the controller has ticked at `until`
pub fn run_until(controller: &mut Controller<'_, MockBoard>, until: Timestamp) {
    while controller.board().now() < until {
        controller.board_mut().clock.advance(1);
        controller.poll();
    }
}

/// Controller over a [`MockBoard`] with its first tick already run
pub fn started(board: MockBoard, flow: &FlowMeter) -> Controller<'_, MockBoard> {
    let mut controller = Controller::new(board, flow);
    controller.poll();
    controller
}
