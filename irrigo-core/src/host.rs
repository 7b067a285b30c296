//! Host runner (requires `host`)
//!
//! Runs the controller as an ordinary process. There is no pulse interrupt,
//! so a [`PulseSource`] is polled once per loop iteration and each reported
//! edge is fed to the flow meter. The loop yields for 1 ms per iteration.

use core::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::constants::time::HOST_LOOP_YIELD_MS;
use crate::controller::Controller;
use crate::time::{Clock, Millis};
use crate::traits::Board;

/// Software replacement for the pulse interrupt
pub trait PulseSource {
    /// Number of pulse edges seen since the last call
    fn poll_pulses(&mut self, now_ms: Millis) -> u32;
}

impl<F> PulseSource for F
where
    F: FnMut(Millis) -> u32,
{
    fn poll_pulses(&mut self, now_ms: Millis) -> u32 {
        self(now_ms)
    }
}

/// A source that never pulses (no flow sensor wired)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPulses;

impl PulseSource for NoPulses {
    fn poll_pulses(&mut self, _now_ms: Millis) -> u32 {
        0
    }
}

/// Loop counters returned by [`run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Loop iterations
    pub iterations: u64,
    /// Ticks executed
    pub ticks: u64,
    /// Pulse edges accepted by the meter
    pub pulses: u64,
}

/// One loop iteration without the yield
///
/// Returns whether a tick ran.
pub fn step<B, P, const N: usize>(
    controller: &mut Controller<'_, B, N>,
    pulses: &mut P,
    stats: &mut RunStats,
) -> bool
where
    B: Board,
    P: PulseSource + ?Sized,
{
    let now_ms = controller.board().millis();
    let edges = pulses.poll_pulses(now_ms);
    // Edges arriving in the same millisecond collapse under debounce
    for _ in 0..edges {
        if controller.flow().on_pulse(now_ms) {
            stats.pulses += 1;
        }
    }
    stats.iterations += 1;
    let ticked = controller.poll();
    if ticked {
        stats.ticks += 1;
    }
    ticked
}

/// Run the controller until `stop` is set
pub fn run<B, P, const N: usize>(
    controller: &mut Controller<'_, B, N>,
    pulses: &mut P,
    stop: &AtomicBool,
) -> RunStats
where
    B: Board,
    P: PulseSource + ?Sized,
{
    let mut stats = RunStats::default();
    log_info!("host loop started");
    while !stop.load(Ordering::Relaxed) {
        step(controller, pulses, &mut stats);
        thread::sleep(Duration::from_millis(HOST_LOOP_YIELD_MS));
    }
    log_info!("host loop stopped after {} ticks", stats.ticks);
    stats
}
