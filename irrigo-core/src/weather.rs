//! Weather refresh gate
//!
//! Refreshes the watering percentage about once an hour, skipping while the
//! network is failing or when this controller is a remote extension. If no
//! refresh has succeeded for a day a reboot is requested.
//!
//! Each attempt is published once: a weather-call event with its outcome
//! and, on success, the current watering percentage. A changed external IP
//! is published as well.

use crate::constants::time::{CHECK_WEATHER_INTERVAL_S, WEATHER_SUCCESS_TIMEOUT_S};
use crate::events::{Event, LogRecord};
use crate::time::Timestamp;
use crate::traits::{EventSink, Logger, OptionStore, WeatherService};

/// Weather refresh timers
#[derive(Debug, Clone, Default)]
pub struct WeatherGate {
    last_attempt: Timestamp,
    last_success: Timestamp,
    last_published: Timestamp,
    last_ip: Option<u32>,
    pending_ip: Option<u32>,
}

impl WeatherGate {
    /// Gate with nothing attempted
    pub const fn new() -> Self {
        Self {
            last_attempt: 0,
            last_success: 0,
            last_published: 0,
            last_ip: None,
            pending_ip: None,
        }
    }

    /// Time of the last attempt (0 if none)
    pub const fn last_attempt(&self) -> Timestamp {
        self.last_attempt
    }

    /// Time of the last successful refresh (0 if none, or reset by the
    /// success watchdog)
    pub const fn last_success(&self) -> Timestamp {
        self.last_success
    }

    /// Run the gate and publish any new attempt
    ///
    /// Returns whether a reboot should be requested.
    pub fn poll<B>(&mut self, board: &mut B, now: Timestamp, network_failing: bool) -> bool
    where
        B: WeatherService + OptionStore + EventSink + Logger + ?Sized,
    {
        let reboot = self.check(board, now, network_failing);
        self.publish(board, now);
        reboot
    }

    fn check<B>(&mut self, board: &mut B, now: Timestamp, network_failing: bool) -> bool
    where
        B: WeatherService + OptionStore + Logger + ?Sized,
    {
        if network_failing || board.remote_extension() {
            return false;
        }

        if self.last_success != 0 && now > self.last_success + WEATHER_SUCCESS_TIMEOUT_S {
            log_warn!("no weather update since {}, reboot requested", self.last_success);
            self.last_success = 0;
            return true;
        }

        if self.last_attempt == 0 || now > self.last_attempt + CHECK_WEATHER_INTERVAL_S {
            self.last_attempt = now;
            match board.refresh(now) {
                Ok(report) => {
                    self.last_success = now;
                    if let Some(pct) = report.water_percentage {
                        if pct != board.water_percentage() {
                            board.set_water_percentage(pct);
                            if board.logging_enabled() {
                                let record = LogRecord::WaterLevel { percent: pct, at: now };
                                if board.write(&record).is_err() {
                                    log_debug!("water level log write failed");
                                }
                            }
                        }
                    }
                    if let Some(ip) = report.external_ip {
                        if self.last_ip != Some(ip) {
                            self.last_ip = Some(ip);
                            self.pending_ip = Some(ip);
                        }
                    }
                }
                Err(_) => log_debug!("weather refresh failed at {}", now),
            }
        }
        false
    }

    fn publish<B>(&mut self, board: &mut B, now: Timestamp)
    where
        B: OptionStore + EventSink + ?Sized,
    {
        if self.last_attempt > self.last_published {
            let success = self.last_success >= self.last_attempt;
            board.emit(Event::WeatherCall { success }, now);
            if success {
                let percent = board.water_percentage();
                board.emit(Event::WaterLevel { percent }, now);
            }
            self.last_published = self.last_attempt;
        }
        if let Some(ip) = self.pending_ip.take() {
            board.emit(Event::IpUpdate { ip }, now);
        }
    }
}
