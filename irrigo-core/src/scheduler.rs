//! Program matching and run placement
//!
//! Once per wall-clock minute every stored program is asked whether it
//! starts now. Each station with a non-zero duration in a matching program
//! gets an unscheduled run; placement then hands out start times:
//!
//! ```text
//!  concurrent:  now+1, now+2, now+3, ...        (1 s stagger)
//!  sequential:  cursor, cursor+d1+delay, ...    (one after another)
//! ```
//!
//! The sequential cursor continues from the end of any sequential run
//! already ahead, so a second program queues behind the first instead of
//! overlapping it. Remote extensions place everything concurrently.
//!
//! A station never runs twice at once: a run for a station that already
//! holds one starts after that station's last scheduled end plus the
//! station delay.

use heapless::Vec;

use crate::constants::program::{LOW_WATER_PERCENT, MIN_SCALED_DURATION_S};
use crate::queue::{ProgramId, RuntimeQueue, ScheduledRun};
use crate::time::{minute_index, Timestamp};
use crate::traits::{OptionStore, Program, ProgramCatalog};
use crate::StationId;

/// Result of one minute's matching pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Programs whose start time matched
    pub matched: usize,
    /// Runs added to the queue
    pub enqueued: usize,
    /// Runs refused by a full queue
    pub dropped: usize,
}

/// Minute watermark plus matching and placement
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    last_minute: Option<u64>,
}

impl Scheduler {
    /// Scheduler with no minute processed
    pub const fn new() -> Self {
        Self { last_minute: None }
    }

    /// Whether `now` falls in a minute not matched yet; advances the watermark
    pub fn minute_due(&mut self, now: Timestamp) -> bool {
        let minute = minute_index(now);
        if self.last_minute == Some(minute) {
            return false;
        }
        self.last_minute = Some(minute);
        true
    }

    /// Apply the watering percentage to a resolved duration
    ///
    /// Very short runs at a very low percentage are not worth opening a
    /// valve for and become 0.
    pub fn scale_for_weather(duration: u64, percent: u8) -> u64 {
        let scaled = duration * percent as u64 / 100;
        if percent < LOW_WATER_PERCENT && scaled < MIN_SCALED_DURATION_S {
            0
        } else {
            scaled
        }
    }

    /// Resolved, weather-scaled duration of a station in a program, with the
    /// watering percentage applied
    pub fn station_duration<B>(board: &B, program: &B::Program, sid: StationId) -> (u64, u8)
    where
        B: ProgramCatalog + OptionStore + ?Sized,
    {
        let raw = program.duration(sid);
        if raw == 0 {
            return (0, 100);
        }
        let resolved = board.resolve_duration(raw);
        if program.use_weather() {
            let pct = board.water_percentage();
            (Self::scale_for_weather(resolved, pct), pct)
        } else {
            (resolved, 100)
        }
    }

    /// Enqueue runs for every program starting at `now`
    ///
    /// Returns `None` if this minute was already processed.
    pub fn enqueue_matches<B, const N: usize>(
        &mut self,
        board: &B,
        queue: &mut RuntimeQueue<N>,
        now: Timestamp,
    ) -> Option<MatchOutcome>
    where
        B: ProgramCatalog + OptionStore + ?Sized,
    {
        if !self.minute_due(now) {
            return None;
        }

        let mut outcome = MatchOutcome::default();
        for index in 0..board.program_count() {
            // Codes past the stored range belong to manual and test runs
            let Some(code) = u8::try_from(index + 1)
                .ok()
                .filter(|&c| c < ProgramId::MANUAL_CODE)
            else {
                log_warn!("programs from {} on have no id, ignored", index + 1);
                break;
            };
            let Some(program) = board.read_program(index) else {
                continue;
            };
            if !program.matches(now) {
                continue;
            }
            outcome.matched += 1;
            let pid = ProgramId::Stored(code);

            for sid in 0..board.station_count() {
                let sid = sid as StationId;
                if board.is_master(sid) || board.station_flags(sid).is_disabled() {
                    continue;
                }
                let (duration, water_level) = Self::station_duration(board, &program, sid);
                if duration == 0 {
                    continue;
                }
                match queue.enqueue(ScheduledRun::new(sid, pid, now, duration, water_level)) {
                    Ok(_) => outcome.enqueued += 1,
                    Err(_) => outcome.dropped += 1,
                }
            }
            log_info!("program {} matched at {}", index + 1, now);
        }
        Some(outcome)
    }

    /// Give every unscheduled run a start time
    ///
    /// Returns the placed slots in placement order.
    pub fn place<O, const N: usize>(
        queue: &mut RuntimeQueue<N>,
        options: &O,
        now: Timestamp,
    ) -> Vec<usize, N>
    where
        O: OptionStore + ?Sized,
    {
        let delay = options.station_delay() as i64;
        let remote = options.remote_extension();
        let earliest = now + 1;

        let mut concurrent = earliest;
        let last_stop = queue.last_sequential_stop();
        let mut sequential = if last_stop > now {
            last_stop.saturating_add_signed(delay).max(earliest)
        } else {
            earliest
        };

        let mut placed: Vec<usize, N> = Vec::new();
        for slot in queue.unscheduled() {
            let Some(run) = queue.get(slot) else {
                continue;
            };
            if run.duration == 0 {
                continue;
            }
            let duration = run.duration;
            let is_sequential = !remote && options.station_flags(run.station).is_sequential();
            // A station already holding a run queues behind its last one
            let after_own = queue
                .busy_until(run.station)
                .map(|end| end.saturating_add_signed(delay).max(end));

            let start = if is_sequential {
                let start = after_own.map_or(sequential, |t| t.max(sequential));
                sequential = start
                    .saturating_add(duration)
                    .saturating_add_signed(delay)
                    .max(earliest);
                start
            } else if let Some(t) = after_own {
                t.max(earliest)
            } else {
                let start = concurrent;
                concurrent += 1;
                start
            };

            if queue.schedule(slot, start).is_ok() {
                // Cannot overflow: at most N runs
                let _ = placed.push(slot);
            }
        }
        placed
    }
}
