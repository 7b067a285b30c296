//! Tick Engine
//!
//! ## Overview
//!
//! [`Controller::poll`] is called as often as the main loop spins. Whenever
//! the wall clock has moved to a new second it runs one tick, a fixed
//! sequence of steps that always runs to completion:
//!
//! ```text
//!  1  apportion flow pulses to open runs
//!  2  rain delay edges
//!  3  rain sensor edges
//!  4  program switch
//!  5  minute-gated program matching and placement
//!  6  if Running: stop pass, start pass, garbage pass, Idle transition
//!  7  master valves
//!  8  preemption (disabled controller, rain), then apply outputs
//!  9  deferred reboot
//! 10  real-time flow sample
//! 11  NTP, network health, weather
//! ```
//!
//! ## States
//!
//! ```text
//!          first run placed
//!   Idle ───────────────────▶ Running
//!    ▲                          │
//!    └──── queue drained ───────┘
//! ```
//!
//! ## Stopping Runs
//!
//! Every station that closes goes through [`Controller::turn_off_station`],
//! which records the last run, writes the log record and emits the close
//! events. Cancelling only zeroes a run's duration; the next stop pass does
//! the rest.
//!
//! ## Reboots
//!
//! Network loss, a stale weather service or a clock set from cold only
//! *request* a reboot. It happens in step 9, once the controller is idle and
//! no program starts within the next minute.

use heapless::Vec;

use crate::constants::flow::FLOW_RT_WINDOW_S;
use crate::constants::program::{SHORT_TEST_DURATION_S, TEST_PROGRAM_DURATION_S};
use crate::constants::time::{RAIN_SENSOR_OFF_DEBOUNCE_S, REBOOT_LOOKAHEAD_S};
use crate::constants::RUNTIME_QUEUE_SIZE;
use crate::errors::{ControllerError, QueueError};
use crate::events::{Event, LogRecord};
use crate::flow::{pulses_to_volume, FlowMeter};
use crate::network::NetworkMonitor;
use crate::options::{MasterId, SensorType};
use crate::queue::{ProgramId, RuntimeQueue, ScheduledRun};
use crate::scheduler::Scheduler;
use crate::time::Timestamp;
use crate::traits::{Board, Program};
use crate::weather::WeatherGate;
use crate::StationId;

/// Global controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControllerState {
    /// Queue empty
    Idle,
    /// Queue holds runs
    Running,
}

/// Most recent completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastRun {
    /// Station that ran
    pub station: StationId,
    /// Program that started it
    pub program: ProgramId,
    /// Actual run time (seconds)
    pub duration: u64,
    /// When it stopped
    pub end: Timestamp,
}

/// Snapshot of controller state for status displays
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerStatus {
    /// Run state
    pub state: ControllerState,
    /// Master enable switch
    pub enabled: bool,
    /// Rain delay in effect
    pub rain_delayed: bool,
    /// Rain sensor reads wet (after debounce)
    pub rain_sensed: bool,
    /// Reboot waiting for an idle moment
    pub reboot_pending: bool,
    /// Consecutive failed network checks
    pub network_failures: u8,
    /// Runs in the queue
    pub queued: usize,
    /// Flow rate measured at the last station shutoff
    pub last_gpm: f32,
    /// Pulses in the last real-time window
    pub realtime_pulses: u32,
}

/// The control core
pub struct Controller<'f, B: Board, const N: usize = RUNTIME_QUEUE_SIZE> {
    board: B,
    flow: &'f FlowMeter,
    queue: RuntimeQueue<N>,
    scheduler: Scheduler,
    network: NetworkMonitor,
    weather: WeatherGate,
    state: ControllerState,
    last_tick: Option<Timestamp>,
    boot_announced: bool,
    rain_delayed: bool,
    rain_delay_since: Timestamp,
    rain_sensed: bool,
    rain_sensed_since: Timestamp,
    flow_seen: u32,
    flow_log_start: u32,
    flow_log_since: Timestamp,
    flow_rt_since: Option<Timestamp>,
    flow_rt_count: u32,
    flow_rt_pulses: u32,
    last_gpm: f32,
    last_run: Option<LastRun>,
    reboot_pending: bool,
}

impl<'f, B: Board, const N: usize> Controller<'f, B, N> {
    /// Controller in the idle state, bound to a board and a flow meter
    pub fn new(board: B, flow: &'f FlowMeter) -> Self {
        let count = flow.pulse_count();
        Self {
            board,
            flow,
            queue: RuntimeQueue::new(),
            scheduler: Scheduler::new(),
            network: NetworkMonitor::new(),
            weather: WeatherGate::new(),
            state: ControllerState::Idle,
            last_tick: None,
            boot_announced: false,
            rain_delayed: false,
            rain_delay_since: 0,
            rain_sensed: false,
            rain_sensed_since: 0,
            flow_seen: count,
            flow_log_start: count,
            flow_log_since: 0,
            flow_rt_since: None,
            flow_rt_count: count,
            flow_rt_pulses: 0,
            last_gpm: 0.0,
            last_run: None,
            reboot_pending: false,
        }
    }

    /// Replace the network monitor (e.g. link already down at boot)
    pub fn with_network(mut self, network: NetworkMonitor) -> Self {
        self.network = network;
        self
    }

    /// The board
    pub fn board(&self) -> &B {
        &self.board
    }

    /// The board, mutable
    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    /// The flow meter
    pub fn flow(&self) -> &'f FlowMeter {
        self.flow
    }

    /// Queued runs
    pub fn queue(&self) -> &RuntimeQueue<N> {
        &self.queue
    }

    /// Network monitor
    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    /// Weather gate
    pub fn weather(&self) -> &WeatherGate {
        &self.weather
    }

    /// Current run state
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Most recent completed run
    pub fn last_run(&self) -> Option<LastRun> {
        self.last_run
    }

    /// Whether a reboot is waiting
    pub fn reboot_pending(&self) -> bool {
        self.reboot_pending
    }

    /// Ask for a reboot at the next safe moment
    pub fn request_reboot(&mut self) {
        self.reboot_pending = true;
    }

    /// Snapshot for status displays
    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            state: self.state,
            enabled: self.board.controller_enabled(),
            rain_delayed: self.rain_delayed,
            rain_sensed: self.rain_sensed,
            reboot_pending: self.reboot_pending,
            network_failures: self.network.failures(),
            queued: self.queue.len(),
            last_gpm: self.last_gpm,
            realtime_pulses: self.flow_rt_pulses,
        }
    }

    /// Run one tick if the clock has moved to a new second
    ///
    /// Returns whether a tick ran.
    pub fn poll(&mut self) -> bool {
        let now = self.board.now();
        if self.last_tick == Some(now) {
            return false;
        }
        self.last_tick = Some(now);
        self.tick(now);
        true
    }

    fn tick(&mut self, now: Timestamp) {
        if !self.boot_announced {
            self.boot_announced = true;
            self.board.emit(Event::RebootComplete, now);
        }

        let sensor = self.board.sensor_type();
        self.flow.set_enabled(sensor == SensorType::Flow);

        if sensor == SensorType::Flow {
            self.apportion_flow();
        }
        self.update_rain_delay(now);
        if sensor == SensorType::Rain {
            self.update_rain_sensor(now);
        }

        if self.board.program_switch_pressed(now) {
            log_info!("program switch pressed");
            self.reset_all_stations_immediate();
            if self.board.program_count() > 0 {
                if let Err(_e) = self.start_program(1, false, now) {
                    log_warn!("program switch start failed");
                }
            }
        }

        if let Some(outcome) = self
            .scheduler
            .enqueue_matches(&self.board, &mut self.queue, now)
        {
            if outcome.dropped > 0 {
                log_warn!("{} runs dropped, queue full", outcome.dropped);
            }
            if outcome.enqueued > 0 {
                self.place_runs(now);
            }
        }

        if self.state == ControllerState::Running {
            self.run_queue(now, sensor);
        }

        self.drive_masters(now);

        self.process_dynamic_events(now, sensor);
        self.board.apply_all();

        self.try_reboot(now);

        if sensor == SensorType::Flow {
            self.sample_flow(now);
        }

        let running = self.state == ControllerState::Running;
        if self.network.poll(&mut self.board, now, running) {
            self.reboot_pending = true;
        }
        let failing = self.network.is_failing();
        if self.weather.poll(&mut self.board, now, failing) {
            self.reboot_pending = true;
        }
    }

    fn apportion_flow(&mut self) {
        let count = self.flow.pulse_count();
        let delta = count.wrapping_sub(self.flow_seen);
        if delta > 0 {
            self.queue.distribute_volume(delta);
        }
        self.flow_seen = count;
    }

    fn update_rain_delay(&mut self, now: Timestamp) {
        let stop = self.board.rain_delay_stop();
        if self.rain_delayed {
            if now >= stop {
                self.rain_delayed = false;
                let duration = now.saturating_sub(self.rain_delay_since);
                log_info!("rain delay over after {} s", duration);
                self.write_log(LogRecord::RainDelay { duration, end: now });
                self.board.emit(Event::RainDelayStop { duration }, now);
            }
        } else if stop > now {
            self.rain_delayed = true;
            self.rain_delay_since = now;
            self.board.emit(Event::RainDelayStart { duration: stop - now }, now);
        }
    }

    fn update_rain_sensor(&mut self, now: Timestamp) {
        let sensed = self.board.rain_sensed();
        if sensed == self.rain_sensed {
            return;
        }
        if sensed {
            self.rain_sensed_since = now;
            self.board.emit(Event::RainSensorOn, now);
        } else if now >= self.rain_sensed_since + RAIN_SENSOR_OFF_DEBOUNCE_S {
            let duration = now - self.rain_sensed_since;
            self.write_log(LogRecord::RainSensor { duration, end: now });
            self.board.emit(Event::RainSensorOff { duration }, now);
        }
        self.rain_sensed = sensed;
    }

    fn place_runs(&mut self, now: Timestamp) {
        let placed = Scheduler::place(&mut self.queue, &self.board, now);
        if placed.is_empty() {
            return;
        }
        let rate = self.board.pulse_rate();
        for &slot in placed.iter() {
            if let Some(stats) = self.queue.program_of_mut(slot) {
                if !stats.announced {
                    stats.announced = true;
                    let report = stats.report(rate);
                    self.board.emit(Event::ProgramSchedule(report), now);
                }
            }
            if let Some(run) = self.queue.get(slot) {
                self.board.emit(Event::StationSchedule(run.report(rate)), now);
            }
        }

        if self.state == ControllerState::Idle {
            self.state = ControllerState::Running;
            if self.board.sensor_type() == SensorType::Flow {
                self.flow_log_start = self.flow.pulse_count();
                self.flow_log_since = now;
            }
            log_info!("running, {} runs placed", placed.len());
        }
    }

    fn run_queue(&mut self, now: Timestamp, sensor: SensorType) {
        let stations = self.board.station_count();

        // Stop pass
        for sid in 0..stations {
            let sid = sid as StationId;
            if self.board.is_master(sid) {
                continue;
            }
            let due = matches!(
                self.queue.run_for(sid),
                Some(run) if run.is_scheduled() && now >= run.end()
            );
            if due {
                self.turn_off_station(sid, now);
            }
        }

        // Start pass
        for sid in 0..stations {
            let sid = sid as StationId;
            if self.board.is_master(sid) || self.board.bit(sid) {
                continue;
            }
            let Some(slot) = self.queue.slot_for(sid) else {
                continue;
            };
            let due = matches!(
                self.queue.get(slot),
                Some(run) if run.is_scheduled() && run.start() <= now && now < run.end()
            );
            if due {
                self.open_station(slot, now);
            }
        }

        // Garbage pass
        let stale: Vec<usize, N> = self
            .queue
            .iter()
            .filter(|(_, r)| r.duration == 0 || (r.is_scheduled() && now >= r.end()))
            .map(|(slot, _)| slot)
            .collect();
        for slot in stale {
            self.queue.dequeue(slot);
        }

        let remote = self.board.remote_extension();
        let last_stop = self
            .queue
            .iter()
            .map(|(_, r)| r)
            .filter(|r| r.end() > now && !remote && self.board.station_flags(r.station).is_sequential())
            .map(ScheduledRun::end)
            .max()
            .unwrap_or(0);
        self.queue.set_last_sequential_stop(last_stop);

        if self.queue.is_empty() {
            self.board.clear_all();
            self.board.apply_all();
            self.queue.reset();
            self.state = ControllerState::Idle;
            if sensor == SensorType::Flow {
                let pulses = self.flow.pulse_count().wrapping_sub(self.flow_log_start);
                let duration = now.saturating_sub(self.flow_log_since);
                self.write_log(LogRecord::FlowSense {
                    pulses,
                    duration,
                    end: now,
                });
            }
            log_info!("idle at {}", now);
        }
    }

    fn open_station(&mut self, slot: usize, now: Timestamp) {
        let Some(run) = self.queue.get(slot).copied() else {
            return;
        };
        let rate = self.board.pulse_rate();
        let (opened, started) = self.queue.mark_open(slot);
        if started {
            if let Some(stats) = self.queue.program_of(slot) {
                self.board.emit(Event::ProgramStart(stats.report(rate)), now);
            }
        }
        if opened {
            self.board.emit(Event::StationOpen(run.report(rate)), now);
        }
        self.board.set_bit(run.station, true);
        self.flow.rearm_warmup();
        log_debug!("station {} open until {}", run.station, run.end());
    }

    fn drive_masters(&mut self, now: Timestamp) {
        for which in MasterId::ALL {
            let Some(rule) = self.board.master(which) else {
                continue;
            };
            let mut active = false;
            for sid in 0..self.board.station_count() {
                let sid = sid as StationId;
                if self.board.is_master(sid)
                    || !self.board.station_flags(sid).uses_master(which)
                    || !self.board.bit(sid)
                {
                    continue;
                }
                let Some(run) = self.queue.run_for(sid) else {
                    continue;
                };
                let on_at = run.start() as i64 + rule.on_adjust as i64;
                let off_at = run.end() as i64 + rule.off_adjust as i64;
                let t = now as i64;
                if t >= on_at && t <= off_at {
                    active = true;
                    break;
                }
            }
            self.board.set_bit(rule.station, active);
        }
    }

    fn process_dynamic_events(&mut self, now: Timestamp, sensor: SensorType) {
        let enabled = self.board.controller_enabled();
        let rain = self.rain_delayed || (sensor == SensorType::Rain && self.rain_sensed);
        if enabled && !rain {
            return;
        }
        for sid in 0..self.board.station_count() {
            let sid = sid as StationId;
            if self.board.is_master(sid) {
                continue;
            }
            let scheduled = matches!(
                self.queue.run_for(sid),
                Some(run) if run.program.is_scheduled()
            );
            if !scheduled {
                continue;
            }
            if !enabled || (rain && !self.board.station_flags(sid).ignores_rain()) {
                self.turn_off_station(sid, now);
            }
        }
    }

    fn try_reboot(&mut self, now: Timestamp) {
        if !self.reboot_pending || self.state != ControllerState::Idle {
            return;
        }
        let imminent = (0..self.board.program_count())
            .filter_map(|i| self.board.read_program(i))
            .any(|p| p.matches(now + REBOOT_LOOKAHEAD_S));
        if imminent {
            return;
        }
        log_warn!("rebooting at {}", now);
        self.reboot_pending = false;
        self.board.reboot();
    }

    fn sample_flow(&mut self, now: Timestamp) {
        let since = *self.flow_rt_since.get_or_insert(now);
        if now < since {
            self.flow_rt_since = Some(now);
            return;
        }
        if now - since < FLOW_RT_WINDOW_S {
            return;
        }
        let count = self.flow.pulse_count();
        self.flow_rt_pulses = count.wrapping_sub(self.flow_rt_count);
        let volume = pulses_to_volume(self.flow_rt_pulses as f32, self.board.pulse_rate());
        self.board.emit(
            Event::FlowUpdate {
                volume,
                duration: now - since,
            },
            now,
        );
        self.flow_rt_since = Some(now);
        self.flow_rt_count = count;
    }

    fn write_log(&mut self, record: LogRecord) {
        if !self.board.logging_enabled() {
            return;
        }
        if self.board.write(&record).is_err() {
            log_debug!("log write failed, kind {}", record.kind() as u8);
        }
    }

    /// Close a station and retire its indexed run
    ///
    /// Runs that already started are logged and reported; runs that had not
    /// started yet are dropped silently. A station without a run is left
    /// alone apart from clearing its output bit.
    pub fn turn_off_station(&mut self, sid: StationId, now: Timestamp) {
        self.board.set_bit(sid, false);
        let Some(slot) = self.queue.slot_for(sid) else {
            return;
        };
        self.last_gpm = self.flow.snapshot().gallons_per_minute();
        let Some(run) = self.queue.get(slot).copied() else {
            return;
        };

        if now > run.start() && !self.board.is_master(sid) {
            let duration = now - run.start();
            self.last_run = Some(LastRun {
                station: sid,
                program: run.program,
                duration,
                end: now,
            });
            // Cannot fail: the slot was just read
            let _ = self.queue.cancel(slot);

            let gpm = (self.board.sensor_type() == SensorType::Flow).then_some(self.last_gpm);
            self.write_log(LogRecord::Station {
                program: run.program,
                station: sid,
                duration,
                end: now,
                gpm,
            });

            let rate = self.board.pulse_rate();
            if run.is_open() {
                let mut report = run.report(rate);
                report.duration = duration;
                self.board.emit(Event::StationClose(report), now);
            }
            if let Some(stats) = self.queue.program_of(slot) {
                if stats.running && stats.count == 1 {
                    self.board.emit(Event::ProgramStop(stats.report(rate)), now);
                }
            }
        }
        self.queue.dequeue(slot);
    }

    /// Cancel every run; stations close and log on the next tick
    pub fn reset_all_stations(&mut self) {
        let slots: Vec<usize, N> = self.queue.iter().map(|(slot, _)| slot).collect();
        for slot in slots {
            // Cannot fail: slots come from the queue itself
            let _ = self.queue.cancel(slot);
        }
    }

    /// Close every station and drop the queue without logging
    pub fn reset_all_stations_immediate(&mut self) {
        self.board.clear_all();
        self.board.apply_all();
        self.queue.reset();
    }

    /// Start a program by hand
    ///
    /// `pid` 0 runs the test program, 255 the short test, anything else the
    /// stored program `pid - 1`. Everything running is stopped first.
    /// Returns the number of runs queued.
    pub fn manual_start_program(&mut self, pid: u8, use_weather: bool) -> Result<usize, ControllerError> {
        let now = self.board.now();
        self.start_program(pid, use_weather, now)
    }

    fn start_program(&mut self, pid: u8, use_weather: bool, now: Timestamp) -> Result<usize, ControllerError> {
        let requested = ProgramId::from_code(pid);
        let program = match requested {
            ProgramId::Stored(n) => Some(
                self.board
                    .read_program(n as usize - 1)
                    .ok_or(ControllerError::UnknownProgram { pid })?,
            ),
            ProgramId::Manual => return Err(ControllerError::UnknownProgram { pid }),
            ProgramId::Test | ProgramId::ShortTest => None,
        };
        let run_program = match requested {
            ProgramId::Test => ProgramId::Test,
            ProgramId::ShortTest => ProgramId::ShortTest,
            _ => ProgramId::Manual,
        };

        self.reset_all_stations_immediate();

        let pct = self.board.water_percentage();
        let mut enqueued = 0;
        for sid in 0..self.board.station_count() {
            let sid = sid as StationId;
            if self.board.is_master(sid) || self.board.station_flags(sid).is_disabled() {
                continue;
            }
            let base = match (&program, requested) {
                (_, ProgramId::Test) => TEST_PROGRAM_DURATION_S,
                (_, ProgramId::ShortTest) => SHORT_TEST_DURATION_S,
                (Some(p), _) => match p.duration(sid) {
                    0 => 0,
                    raw => self.board.resolve_duration(raw),
                },
                (None, _) => 0,
            };
            let (duration, water_level) = if use_weather {
                (base * pct as u64 / 100, pct)
            } else {
                (base, 100)
            };
            if duration == 0 {
                continue;
            }
            let run = ScheduledRun::new(sid, run_program, now, duration, water_level);
            match self.queue.enqueue(run) {
                Ok(_) => enqueued += 1,
                Err(QueueError::QueueFull { .. }) => break,
                Err(e) => return Err(e.into()),
            }
        }

        if enqueued > 0 {
            self.place_runs(now);
        }
        log_info!("manual start {}, {} runs", pid, enqueued);
        Ok(enqueued)
    }
}
