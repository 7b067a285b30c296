//! Runtime Queue of Pending and Active Station Runs
//!
//! ## Overview
//!
//! Every station run the controller knows about lives in a fixed-capacity
//! arena. A run is enqueued unscheduled (start time 0), receives its start
//! time exactly once during placement, is opened and closed by the tick,
//! and is finally dequeued.
//!
//! ```text
//!   enqueue ──▶ [unscheduled] ──schedule──▶ [scheduled] ──open──▶ [running]
//!                     │                         │                    │
//!                     └──────────── dequeue ◀───┴──── cancel/close ◀─┘
//! ```
//!
//! ## Layout
//!
//! ```text
//! runs:          ┌─────┬─────┬─────┬─────┬─────┐
//!                │ s3  │  -  │ s1  │ s3  │  -  │   slots are stable
//!                └─────┴─────┴─────┴─────┴─────┘
//!                   ▲           ▲
//! station_index: s1 ┘───────────┘   s3 ──▶ slot 0 (earliest start)
//!
//! programs:      one ProgramRunStats per invocation (program, enqueued_at),
//!                referenced by slot from each run and released when its
//!                last run is dequeued
//! ```
//!
//! Slots never move, so a slot number handed out by [`RuntimeQueue::enqueue`]
//! stays valid until that run is dequeued and [`RuntimeQueue::dequeue`] is
//! idempotent. Placement walks unscheduled runs in insertion order, not slot
//! order.
//!
//! ## Duplicate Stations
//!
//! A station may hold several runs (for example two overlapping programs).
//! The station index always points at the one with the earliest start;
//! unscheduled runs sort last. Dequeuing the indexed run re-points the index
//! at the next earliest, so the others run in turn. Placement starts each
//! extra run after the station's last scheduled end
//! ([`RuntimeQueue::busy_until`]), so runs of one station never overlap.
//!
//! ## Ownership
//!
//! The queue is owned by the tick and never touched from interrupt context;
//! flow pulses reach it only through [`RuntimeQueue::distribute_volume`].

use heapless::Vec;

use crate::constants::MAX_STATIONS;
use crate::errors::QueueError;
use crate::events::{ProgramReport, RunReport};
use crate::flow::pulses_to_volume;
use crate::time::Timestamp;
use crate::StationId;

/// Which program a run belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProgramId {
    /// Built-in test program (every station 60 s)
    Test,
    /// Stored program, numbered from 1
    Stored(u8),
    /// Manually started stored program or single station
    Manual,
    /// Built-in short test program (every station 2 s)
    ShortTest,
}

impl ProgramId {
    /// Code of the built-in test program
    pub const TEST_CODE: u8 = 0;
    /// Code of manual runs
    pub const MANUAL_CODE: u8 = 254;
    /// Code of the short test program
    pub const SHORT_TEST_CODE: u8 = 255;

    /// Wire code
    pub const fn code(&self) -> u8 {
        match self {
            Self::Test => Self::TEST_CODE,
            Self::Stored(n) => *n,
            Self::Manual => Self::MANUAL_CODE,
            Self::ShortTest => Self::SHORT_TEST_CODE,
        }
    }

    /// Decode a wire code
    pub const fn from_code(code: u8) -> Self {
        match code {
            Self::TEST_CODE => Self::Test,
            Self::MANUAL_CODE => Self::Manual,
            Self::SHORT_TEST_CODE => Self::ShortTest,
            n => Self::Stored(n),
        }
    }

    /// Whether the run came from a stored schedule
    ///
    /// Only these runs are preempted by rain or the enable switch.
    pub const fn is_scheduled(&self) -> bool {
        matches!(self, Self::Stored(_))
    }
}

/// Identity of one program invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvocationKey {
    /// Program that was invoked
    pub program: ProgramId,
    /// Time of the invocation
    pub enqueued_at: Timestamp,
}

/// One station run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledRun {
    /// Station to run
    pub station: StationId,
    /// Program that queued the run
    pub program: ProgramId,
    /// When the run was created; identifies its invocation
    pub enqueued_at: Timestamp,
    /// Planned duration (seconds); 0 once cancelled
    pub duration: u64,
    /// Watering percentage applied when the duration was computed
    pub water_level: u8,
    start: Timestamp,
    volume: f32,
    running: bool,
    seq: u32,
    stats_slot: u8,
}

impl ScheduledRun {
    /// Unscheduled run
    pub const fn new(
        station: StationId,
        program: ProgramId,
        enqueued_at: Timestamp,
        duration: u64,
        water_level: u8,
    ) -> Self {
        Self {
            station,
            program,
            enqueued_at,
            duration,
            water_level,
            start: 0,
            volume: 0.0,
            running: false,
            seq: 0,
            stats_slot: 0,
        }
    }

    /// Start time, 0 while unscheduled
    pub const fn start(&self) -> Timestamp {
        self.start
    }

    /// Scheduled end (`start + duration`)
    pub const fn end(&self) -> Timestamp {
        self.start + self.duration
    }

    /// Whether a start time is assigned
    pub const fn is_scheduled(&self) -> bool {
        self.start != 0
    }

    /// Whether the station has been opened for this run
    pub const fn is_open(&self) -> bool {
        self.running
    }

    /// Accumulated flow pulses
    pub const fn pulses(&self) -> f32 {
        self.volume
    }

    /// Invocation this run belongs to
    pub const fn invocation(&self) -> InvocationKey {
        InvocationKey {
            program: self.program,
            enqueued_at: self.enqueued_at,
        }
    }

    /// Notification payload
    pub fn report(&self, pulse_rate: u16) -> RunReport {
        RunReport {
            station: self.station,
            program: self.program,
            start: self.start,
            duration: self.duration,
            water_level: self.water_level,
            volume: pulses_to_volume(self.volume, pulse_rate),
        }
    }
}

/// Aggregate state of one program invocation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgramRunStats {
    /// Invocation identity
    pub key: InvocationKey,
    /// Runs of this invocation still queued
    pub count: u16,
    /// At least one station has opened
    pub running: bool,
    /// Program-schedule notification sent
    pub announced: bool,
    /// Accumulated flow pulses
    pub volume: f32,
    /// Earliest scheduled start (0 until the first run is placed)
    pub start: Timestamp,
    /// Latest scheduled end
    pub end: Timestamp,
    /// Watering percentage of the invocation
    pub water_level: u8,
}

impl ProgramRunStats {
    const fn new(key: InvocationKey, water_level: u8) -> Self {
        Self {
            key,
            count: 1,
            running: false,
            announced: false,
            volume: 0.0,
            start: 0,
            end: 0,
            water_level,
        }
    }

    /// Notification payload; volume is converted with `pulse_rate`
    pub fn report(&self, pulse_rate: u16) -> ProgramReport {
        ProgramReport {
            program: self.key.program,
            start: self.start,
            end: self.end,
            water_level: self.water_level,
            volume: pulses_to_volume(self.volume, pulse_rate),
        }
    }
}

/// Queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Runs accepted
    pub enqueued: u32,
    /// Runs dequeued
    pub dequeued: u32,
    /// Runs refused because the queue was full
    pub dropped: u32,
    /// Highest occupancy seen
    pub max_depth: u32,
}

impl QueueStats {
    const fn new() -> Self {
        Self {
            enqueued: 0,
            dequeued: 0,
            dropped: 0,
            max_depth: 0,
        }
    }
}

/// Fixed-capacity run queue
///
/// `N` must not exceed 255 so slot numbers fit the station index.
pub struct RuntimeQueue<const N: usize> {
    runs: [Option<ScheduledRun>; N],
    programs: [Option<ProgramRunStats>; N],
    station_index: [Option<u8>; MAX_STATIONS],
    len: usize,
    next_seq: u32,
    last_sequential_stop: Timestamp,
    stats: QueueStats,
}

impl<const N: usize> RuntimeQueue<N> {
    const SLOTS_FIT_INDEX: () = assert!(N <= u8::MAX as usize, "queue capacity above 255");

    /// Create an empty queue
    ///
    /// Can be used in static context
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::SLOTS_FIT_INDEX;
        Self {
            runs: [None; N],
            programs: [None; N],
            station_index: [None; MAX_STATIONS],
            len: 0,
            next_seq: 0,
            last_sequential_stop: 0,
            stats: QueueStats::new(),
        }
    }

    /// Slot count
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Queued runs
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing is queued
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether every slot is taken
    pub const fn is_full(&self) -> bool {
        self.len == N
    }

    /// Lifetime counters
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    /// Add an unscheduled run
    ///
    /// Returns the run's slot. A full queue drops the run and counts it.
    pub fn enqueue(&mut self, mut run: ScheduledRun) -> Result<usize, QueueError> {
        let sid = run.station as usize;
        if sid >= MAX_STATIONS {
            return Err(QueueError::InvalidStation {
                station: run.station,
            });
        }

        let Some(slot) = self.runs.iter().position(Option::is_none) else {
            self.stats.dropped = self.stats.dropped.saturating_add(1);
            log_warn!("queue full, dropping run for station {}", run.station);
            return Err(QueueError::QueueFull { capacity: N });
        };

        let key = run.invocation();
        let stats_slot = match self
            .programs
            .iter()
            .position(|p| matches!(p, Some(s) if s.key == key))
        {
            Some(i) => {
                if let Some(p) = self.programs[i].as_mut() {
                    p.count = p.count.saturating_add(1);
                }
                i
            }
            None => {
                // At most one group per queued run, so a free entry exists
                let Some(i) = self.programs.iter().position(Option::is_none) else {
                    self.stats.dropped = self.stats.dropped.saturating_add(1);
                    return Err(QueueError::QueueFull { capacity: N });
                };
                self.programs[i] = Some(ProgramRunStats::new(key, run.water_level));
                i
            }
        };

        run.start = 0;
        run.volume = 0.0;
        run.running = false;
        run.seq = self.next_seq;
        run.stats_slot = stats_slot as u8;
        self.next_seq = self.next_seq.wrapping_add(1);

        self.runs[slot] = Some(run);
        self.len += 1;
        self.stats.enqueued = self.stats.enqueued.saturating_add(1);
        self.stats.max_depth = self.stats.max_depth.max(self.len as u32);

        if self.station_index[sid].is_none() {
            self.station_index[sid] = Some(slot as u8);
        }
        Ok(slot)
    }

    /// Assign a run's start time (once)
    pub fn schedule(&mut self, slot: usize, start: Timestamp) -> Result<(), QueueError> {
        if start == 0 {
            return Err(QueueError::ReservedStart);
        }
        let run = self
            .runs
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(QueueError::EmptySlot { slot })?;
        if run.start != 0 {
            return Err(QueueError::AlreadyScheduled { slot });
        }
        run.start = start;
        let end = run.end();
        let sid = run.station as usize;

        if let Some(p) = self.programs[run.stats_slot as usize].as_mut() {
            p.start = if p.start == 0 { start } else { p.start.min(start) };
            p.end = p.end.max(end);
        }

        // Keep the index on the earliest run of the station
        let repoint = match self.station_index[sid] {
            None => true,
            Some(cur) if cur as usize == slot => false,
            Some(cur) => match self.runs[cur as usize].as_ref() {
                Some(current) => current.start == 0 || start < current.start,
                None => true,
            },
        };
        if repoint {
            self.station_index[sid] = Some(slot as u8);
        }
        Ok(())
    }

    /// Mark a run cancelled (duration 0)
    ///
    /// Cancelled runs are removed by the next garbage pass.
    pub fn cancel(&mut self, slot: usize) -> Result<(), QueueError> {
        let run = self
            .runs
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(QueueError::EmptySlot { slot })?;
        run.duration = 0;
        let stats_slot = run.stats_slot;

        let end = self
            .runs
            .iter()
            .flatten()
            .filter(|r| r.stats_slot == stats_slot && r.is_scheduled())
            .map(ScheduledRun::end)
            .max()
            .unwrap_or(0);
        if let Some(p) = self.programs[stats_slot as usize].as_mut() {
            p.end = end;
        }
        Ok(())
    }

    /// Remove a run
    ///
    /// Clears (or re-points) the station index and releases the
    /// invocation's stats when this was its last run. Removing an empty slot
    /// is a no-op.
    pub fn dequeue(&mut self, slot: usize) -> Option<ScheduledRun> {
        let run = self.runs.get_mut(slot)?.take()?;
        self.len -= 1;
        self.stats.dequeued = self.stats.dequeued.saturating_add(1);

        let sid = run.station as usize;
        if self.station_index[sid] == Some(slot as u8) {
            self.station_index[sid] = self.earliest_for(run.station).map(|s| s as u8);
        }

        let stats_slot = run.stats_slot as usize;
        if let Some(p) = self.programs[stats_slot].as_mut() {
            p.count = p.count.saturating_sub(1);
            if p.count == 0 {
                self.programs[stats_slot] = None;
            }
        }
        Some(run)
    }

    /// Drop everything, including the sequential cursor
    pub fn reset(&mut self) {
        self.runs = [None; N];
        self.programs = [None; N];
        self.station_index = [None; MAX_STATIONS];
        self.len = 0;
        self.last_sequential_stop = 0;
    }

    /// Run in `slot`
    pub fn get(&self, slot: usize) -> Option<&ScheduledRun> {
        self.runs.get(slot).and_then(Option::as_ref)
    }

    /// Indexed run slot of a station
    pub fn slot_for(&self, sid: StationId) -> Option<usize> {
        self.station_index
            .get(sid as usize)
            .copied()
            .flatten()
            .map(usize::from)
    }

    /// Indexed run of a station
    pub fn run_for(&self, sid: StationId) -> Option<&ScheduledRun> {
        self.slot_for(sid).and_then(|s| self.get(s))
    }

    /// Latest end among a station's scheduled, live runs
    pub fn busy_until(&self, sid: StationId) -> Option<Timestamp> {
        self.iter()
            .filter(|(_, r)| r.station == sid && r.is_scheduled() && r.duration > 0)
            .map(|(_, r)| r.end())
            .max()
    }

    /// Occupied slots with their runs, in slot order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ScheduledRun)> + '_ {
        self.runs
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().map(|r| (i, r)))
    }

    /// Slots of unscheduled runs, in insertion order
    pub fn unscheduled(&self) -> Vec<usize, N> {
        let mut slots: Vec<usize, N> = Vec::new();
        for (slot, _) in self.iter().filter(|(_, r)| !r.is_scheduled()) {
            // Cannot overflow: at most N runs
            let _ = slots.push(slot);
        }
        let runs = &self.runs;
        slots.sort_unstable_by_key(|&s| runs[s].map(|r| r.seq).unwrap_or(u32::MAX));
        slots
    }

    /// Invocation stats of the run in `slot`
    pub fn program_of(&self, slot: usize) -> Option<&ProgramRunStats> {
        let run = self.get(slot)?;
        self.programs[run.stats_slot as usize].as_ref()
    }

    pub(crate) fn program_of_mut(&mut self, slot: usize) -> Option<&mut ProgramRunStats> {
        let stats_slot = self.get(slot)?.stats_slot as usize;
        self.programs[stats_slot].as_mut()
    }

    /// Live invocations
    pub fn programs(&self) -> impl Iterator<Item = &ProgramRunStats> + '_ {
        self.programs.iter().flatten()
    }

    /// Mark the run open; returns (station newly opened, program newly started)
    pub fn mark_open(&mut self, slot: usize) -> (bool, bool) {
        let Some(run) = self.runs.get_mut(slot).and_then(Option::as_mut) else {
            return (false, false);
        };
        let station_opened = !run.running;
        run.running = true;
        let program_started = match self.programs[run.stats_slot as usize].as_mut() {
            Some(p) if !p.running => {
                p.running = true;
                true
            }
            _ => false,
        };
        (station_opened, program_started)
    }

    /// Split `pulses` evenly across all open runs and their invocations
    ///
    /// Returns the number of runs that shared the pulses.
    pub fn distribute_volume(&mut self, pulses: u32) -> usize {
        let open = self.runs.iter().flatten().filter(|r| r.running).count();
        if open == 0 || pulses == 0 {
            return 0;
        }
        let share = pulses as f32 / open as f32;
        for run in self.runs.iter_mut().flatten().filter(|r| r.running) {
            run.volume += share;
            if let Some(p) = self.programs[run.stats_slot as usize].as_mut() {
                p.volume += share;
            }
        }
        open
    }

    /// End of the last sequential run still ahead
    pub const fn last_sequential_stop(&self) -> Timestamp {
        self.last_sequential_stop
    }

    /// Record the end of the last sequential run
    pub fn set_last_sequential_stop(&mut self, t: Timestamp) {
        self.last_sequential_stop = t;
    }

    /// Check the station index and invocation links against the runs
    pub fn index_consistent(&self) -> bool {
        for (sid, entry) in self.station_index.iter().enumerate() {
            let has_runs = self.iter().any(|(_, r)| r.station as usize == sid);
            match entry {
                Some(slot) => match self.get(*slot as usize) {
                    Some(run) if run.station as usize == sid => {}
                    _ => return false,
                },
                None if has_runs => return false,
                None => {}
            }
        }
        self.programs.iter().enumerate().all(|(i, p)| match p {
            Some(p) => {
                let linked = self.iter().filter(|(_, r)| r.stats_slot as usize == i).count();
                linked == p.count as usize && linked > 0
            }
            None => self.iter().all(|(_, r)| r.stats_slot as usize != i),
        })
    }

    fn earliest_for(&self, sid: StationId) -> Option<usize> {
        self.iter()
            .filter(|(_, r)| r.station == sid)
            .min_by_key(|(_, r)| if r.is_scheduled() { r.start } else { Timestamp::MAX })
            .map(|(slot, _)| slot)
    }
}

impl<const N: usize> Default for RuntimeQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
