//! Network health and time sync
//!
//! ## Health Escalation
//!
//! Every ten minutes (never while watering) the gateway is pinged:
//!
//! ```text
//!  failures:  0 ──miss──▶ 1 ──▶ 2 ──▶ 3 ──▶ 4 ──▶ 5 ──▶ 6 (clamped)
//!             ▲                       └──reconnect──┘      │
//!             └────── reply or successful reconnect        └─▶ reboot request
//! ```
//!
//! A reboot is only ever requested here; the controller performs it once
//! idle with nothing about to start.
//!
//! ## Time Sync
//!
//! NTP runs roughly daily while the link is healthy and nothing is
//! watering. If the sync lifts the clock from "never set" to a plausible
//! date, every timer was armed against garbage and a reboot is requested.

use crate::constants::limits::{NETWORK_MAX_FAILURES, NETWORK_RECONNECT_AFTER};
use crate::constants::time::{CHECK_NETWORK_INTERVAL_S, NTP_SYNC_INTERVAL_S, PING_TIMEOUT_MS};
use crate::time::{elapsed_ms, is_plausible, Clock, Timestamp};
use crate::traits::{NetworkLink, OptionStore};

/// Outcome of one health check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetworkHealth {
    /// Gateway replied
    Healthy,
    /// Missed reply, not escalated yet (or reconnect failed)
    Degraded { failures: u8 },
    /// Missed reply, reconnect succeeded
    Reconnected,
    /// Failure limit reached
    RebootRequired,
}

/// Outcome of one NTP attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimeSync {
    /// Disabled, link failing or controller busy
    Skipped,
    /// Time server did not answer
    Failed,
    /// Clock corrected
    Synced,
    /// Clock was never set before this sync
    SyncedFromCold,
}

/// Periodic network housekeeping
#[derive(Debug, Clone, Default)]
pub struct NetworkMonitor {
    failures: u8,
    last_check: Option<Timestamp>,
    last_ntp: Option<Timestamp>,
}

impl NetworkMonitor {
    /// Healthy monitor, nothing checked yet
    pub const fn new() -> Self {
        Self {
            failures: 0,
            last_check: None,
            last_ntp: None,
        }
    }

    /// Start with failures already counted (link down at boot)
    pub fn with_failures(mut self, failures: u8) -> Self {
        self.failures = failures.min(NETWORK_MAX_FAILURES);
        self
    }

    /// Consecutive failed checks
    pub const fn failures(&self) -> u8 {
        self.failures
    }

    /// Whether the last check failed
    pub const fn is_failing(&self) -> bool {
        self.failures > 0
    }

    /// Ping the gateway and wait up to 200 ms for the reply
    pub fn ping<L>(link: &mut L) -> bool
    where
        L: NetworkLink + Clock + ?Sized,
    {
        if link.send_ping().is_err() {
            return false;
        }
        let start = link.millis();
        loop {
            match link.poll_ping_reply() {
                Ok(()) => return true,
                Err(nb::Error::Other(_)) => return false,
                Err(nb::Error::WouldBlock) => {}
            }
            if elapsed_ms(link.millis(), start) >= PING_TIMEOUT_MS {
                return false;
            }
        }
    }

    /// Fold one ping result into the failure counter
    pub fn record_ping<L>(&mut self, link: &mut L, replied: bool) -> NetworkHealth
    where
        L: NetworkLink + ?Sized,
    {
        if replied {
            self.failures = 0;
            return NetworkHealth::Healthy;
        }

        self.failures = (self.failures + 1).min(NETWORK_MAX_FAILURES);
        if self.failures >= NETWORK_MAX_FAILURES {
            log_warn!("network down after {} checks, reboot requested", self.failures);
            NetworkHealth::RebootRequired
        } else if self.failures > NETWORK_RECONNECT_AFTER {
            match link.reconnect() {
                Ok(()) => {
                    log_info!("network reconnected");
                    self.failures = 0;
                    NetworkHealth::Reconnected
                }
                Err(_) => NetworkHealth::Degraded {
                    failures: self.failures,
                },
            }
        } else {
            NetworkHealth::Degraded {
                failures: self.failures,
            }
        }
    }

    /// Ping and escalate
    pub fn check_health<L>(&mut self, link: &mut L) -> NetworkHealth
    where
        L: NetworkLink + Clock + ?Sized,
    {
        let replied = Self::ping(link);
        self.record_ping(link, replied)
    }

    /// Try an NTP sync
    pub fn sync_time<L>(&mut self, link: &mut L, ntp_enabled: bool, running: bool) -> TimeSync
    where
        L: NetworkLink + Clock + ?Sized,
    {
        if !ntp_enabled || self.is_failing() || running {
            return TimeSync::Skipped;
        }
        let was_cold = !is_plausible(link.now());
        match link.fetch_ntp_time() {
            Ok(t) if t > 0 => {
                link.set_time(t);
                link.set_rtc(t);
                if was_cold && is_plausible(link.now()) {
                    log_info!("clock set from cold at {}", t);
                    TimeSync::SyncedFromCold
                } else {
                    TimeSync::Synced
                }
            }
            _ => {
                log_debug!("ntp sync failed");
                TimeSync::Failed
            }
        }
    }

    /// Drive the NTP and health timers
    ///
    /// Both timers arm at the first call. Returns whether a reboot should
    /// be requested.
    pub fn poll<B>(&mut self, board: &mut B, now: Timestamp, running: bool) -> bool
    where
        B: NetworkLink + Clock + OptionStore + ?Sized,
    {
        let mut reboot = false;

        let last_ntp = *self.last_ntp.get_or_insert(now);
        if interval_elapsed(now, last_ntp, NTP_SYNC_INTERVAL_S) {
            let ntp_enabled = board.ntp_enabled();
            if self.sync_time(board, ntp_enabled, running) == TimeSync::SyncedFromCold {
                reboot = true;
            }
            self.last_ntp = Some(now);
        }

        let last_check = *self.last_check.get_or_insert(now);
        if now != 0 && interval_elapsed(now, last_check, CHECK_NETWORK_INTERVAL_S) {
            if !running && self.check_health(board) == NetworkHealth::RebootRequired {
                reboot = true;
            }
            self.last_check = Some(now);
        }
        reboot
    }
}

// A clock that stepped backwards counts as elapsed
fn interval_elapsed(now: Timestamp, last: Timestamp, interval: u64) -> bool {
    now < last || now - last >= interval
}
