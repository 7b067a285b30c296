//! Flow Meter Shared Between the Pulse Interrupt and the Tick
//!
//! ## Overview
//!
//! A pulse flow sensor toggles a pin once per unit of water. The interrupt
//! handler calls [`FlowMeter::on_pulse`]; the tick reads counters through
//! [`FlowMeter::pulse_count`] and [`FlowMeter::snapshot`]. Nothing blocks
//! and no lock is taken on either side.
//!
//! ```text
//!  pin ISR ──on_pulse──▶ ┌────────────┐ ◀──snapshot──── tick
//!                        │ FlowMeter  │ ◀──pulse_count── tick
//!  tick ──rearm_warmup─▶ └────────────┘
//! ```
//!
//! ## Single Writer
//!
//! Every counter is written only by the interrupt handler, with plain
//! atomic loads and stores (no read-modify-write, so it works on cores
//! without compare-and-swap). The tick never writes the counters; when a
//! valve opens it *requests* a warm-up restart through a flag that the next
//! pulse consumes.
//!
//! Multi-field reads use a sequence counter: the handler makes it odd
//! before touching the rate fields and even afterwards, and the reader
//! retries if it changed underneath.
//!
//! ## Rate Measurement
//!
//! ```text
//!  valve opens       first pulse          warm-up over
//!      │                  │◀─── 90 s ───────▶│
//!      ▼                  ▼                  ▼
//!  ────┴──────────────────┼──┼───┼──┼────────┼───┼───┼──▶ time
//!                         (ignored for rate)   begin      stop
//! ```
//!
//! Pulses closer than 50 ms to the previous accepted pulse are bounce and
//! dropped entirely. After warm-up the meter records the first pulse time
//! (`begin`), the latest (`stop`) and a gallon counter; the rate is
//! `60000 / ((stop - begin) / (gallons - 1))` per minute.

use core::sync::atomic::{fence, AtomicBool, AtomicU32, Ordering};

use crate::constants::flow::{FLOW_WARMUP_MS, PULSE_DEBOUNCE_MS, PULSE_RATE_SCALE};
use crate::constants::time::MS_PER_MINUTE;
use crate::time::{elapsed_ms, Millis};

/// Convert pulses to volume units
#[inline]
pub fn pulses_to_volume(pulses: f32, pulse_rate: u16) -> f32 {
    pulses * pulse_rate as f32 / PULSE_RATE_SCALE
}

/// Consistent copy of the rate fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlowSnapshot {
    /// Accepted pulses since boot
    pub count: u32,
    /// First pulse after warm-up
    pub begin_ms: Millis,
    /// Latest pulse
    pub stop_ms: Millis,
    /// Gallon counter; one more than the post-warm-up pulses
    pub gallons: u32,
}

impl FlowSnapshot {
    /// Pulses counted after the warm-up window
    pub const fn measured_pulses(&self) -> u32 {
        self.gallons.saturating_sub(1)
    }

    /// Flow rate over the measured window (units per minute)
    pub fn gallons_per_minute(&self) -> f32 {
        if self.gallons <= 1 {
            return 0.0;
        }
        let ms_per_gallon = elapsed_ms(self.stop_ms, self.begin_ms) / (self.gallons - 1);
        if ms_per_gallon == 0 {
            return 0.0;
        }
        MS_PER_MINUTE as f32 / ms_per_gallon as f32
    }
}

/// Flow pulse counter
///
/// Lives in a `static` shared between the pulse interrupt and the tick.
pub struct FlowMeter {
    enabled: AtomicBool,
    rearm: AtomicBool,
    seq: AtomicU32,
    count: AtomicU32,
    last_pulse_ms: AtomicU32,
    start_ms: AtomicU32,
    begin_ms: AtomicU32,
    stop_ms: AtomicU32,
    gallons: AtomicU32,
}

impl FlowMeter {
    /// Create a meter
    ///
    /// Can be used in static context. The first pulse starts a warm-up.
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            rearm: AtomicBool::new(true),
            seq: AtomicU32::new(0),
            count: AtomicU32::new(0),
            last_pulse_ms: AtomicU32::new(0),
            start_ms: AtomicU32::new(0),
            begin_ms: AtomicU32::new(0),
            stop_ms: AtomicU32::new(0),
            gallons: AtomicU32::new(0),
        }
    }

    /// Enable or disable counting (no flow sensor configured)
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether pulses are being counted
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Record one pulse edge (interrupt context)
    ///
    /// Returns whether the pulse was accepted.
    pub fn on_pulse(&self, now_ms: Millis) -> bool {
        if !self.enabled.load(Ordering::Relaxed) {
            return false;
        }
        if elapsed_ms(now_ms, self.last_pulse_ms.load(Ordering::Relaxed)) < PULSE_DEBOUNCE_MS {
            return false;
        }

        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        self.count
            .store(self.count.load(Ordering::Relaxed).wrapping_add(1), Ordering::Relaxed);
        self.last_pulse_ms.store(now_ms, Ordering::Relaxed);

        let mut gallons = self.gallons.load(Ordering::Relaxed);
        // The tick cannot run between this load and store
        if self.rearm.load(Ordering::Acquire) {
            self.rearm.store(false, Ordering::Relaxed);
            gallons = 0;
            self.start_ms.store(now_ms, Ordering::Relaxed);
        }

        let start = self.start_ms.load(Ordering::Relaxed);
        if elapsed_ms(now_ms, start) < FLOW_WARMUP_MS {
            gallons = 0;
        } else if gallons == 1 {
            self.begin_ms.store(now_ms, Ordering::Relaxed);
        }
        self.stop_ms.store(now_ms, Ordering::Relaxed);
        self.gallons.store(gallons.wrapping_add(1), Ordering::Relaxed);

        self.seq.store(seq.wrapping_add(2), Ordering::Release);
        true
    }

    /// Accepted pulses since boot (wraps)
    pub fn pulse_count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    /// Ask the next pulse to restart the warm-up window
    ///
    /// Called by the tick whenever a valve opens.
    pub fn rearm_warmup(&self) {
        self.rearm.store(true, Ordering::Release);
    }

    /// Read the rate fields consistently
    pub fn snapshot(&self) -> FlowSnapshot {
        let mut snap = self.read_fields();
        for _ in 0..4 {
            let before = self.seq.load(Ordering::Acquire);
            if before % 2 == 1 {
                continue;
            }
            snap = self.read_fields();
            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == before {
                return snap;
            }
        }
        snap
    }

    fn read_fields(&self) -> FlowSnapshot {
        FlowSnapshot {
            count: self.count.load(Ordering::Relaxed),
            begin_ms: self.begin_ms.load(Ordering::Relaxed),
            stop_ms: self.stop_ms.load(Ordering::Relaxed),
            gallons: self.gallons.load(Ordering::Relaxed),
        }
    }
}

impl Default for FlowMeter {
    fn default() -> Self {
        Self::new()
    }
}
