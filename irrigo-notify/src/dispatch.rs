//! Channel routing and delivery statistics
//!
//! [`Notifier`] is an [`EventSink`]: wire it into a board and every
//! controller event is rendered once per interested channel and handed to
//! the [`Transport`]. Delivery is fire-and-forget; failures are counted and
//! logged, never returned to the controller.

use irrigo_core::{Event, EventKind, EventSink, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::NotifyConfig;
use crate::format::{self, DefaultNames, NameLookup};
use crate::NotifyError;

/// IFTTT maker service base URL
pub const IFTTT_URL: &str = "https://maker.ifttt.com";

/// Selection of events delivered to the IFTTT channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventMask(u8);

impl EventMask {
    /// Program started
    pub const PROGRAM: Self = Self(0x01);
    /// Rain sensor on or off
    pub const RAIN_SENSOR: Self = Self(0x02);
    /// Real-time flow sample
    pub const FLOW: Self = Self(0x04);
    /// Water level changed
    pub const WATER_LEVEL: Self = Self(0x08);
    /// Controller rebooted
    pub const REBOOT: Self = Self(0x10);
    /// Station finished a run
    pub const STATION_RUN: Self = Self(0x20);

    /// No events
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every maskable event
    pub const fn all() -> Self {
        Self(0x3f)
    }

    /// From a stored option byte; unknown bits are kept
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw option byte
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Whether no event is selected
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is set
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Index of the lowest set bit
    pub const fn position(&self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }

    /// Bit selecting `kind`; empty for events never pushed
    pub const fn of(kind: EventKind) -> Self {
        match kind {
            EventKind::ProgramStart => Self::PROGRAM,
            EventKind::RainSensorOn | EventKind::RainSensorOff => Self::RAIN_SENSOR,
            EventKind::FlowUpdate => Self::FLOW,
            EventKind::WaterLevel => Self::WATER_LEVEL,
            EventKind::RebootComplete => Self::REBOOT,
            EventKind::StationClose => Self::STATION_RUN,
            _ => Self::empty(),
        }
    }

    /// True if events of `kind` pass this mask
    pub const fn allows(&self, kind: EventKind) -> bool {
        let bit = Self::of(kind);
        !bit.is_empty() && self.contains(bit)
    }
}

/// Kind of destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// IFTTT maker trigger: text, JSON and value as `value1..3`
    Ifttt,
    /// InfluxDB line protocol
    Influx,
    /// JSON webhook
    Webhook,
}

/// Resolved destination of one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Channel kind
    pub channel: Channel,
    /// Full request URL
    pub url: String,
    /// `Authorization` header value, if any
    pub auth: Option<String>,
    /// Body content type
    pub content_type: &'static str,
}

/// Delivers rendered bodies
///
/// Implementations own the network side (HTTP client, queueing, retries).
pub trait Transport {
    /// Deliver one body to `target`
    fn post(&mut self, target: &Target, body: &str) -> Result<(), NotifyError>;
}

/// Delivery statistics
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DispatchStats {
    /// Events received from the controller
    pub events: u64,
    /// Messages delivered
    pub sent: u64,
    /// Messages the transport rejected
    pub failed: u64,
    /// Events no channel wanted
    pub filtered: u64,
    /// Body bytes delivered
    pub bytes_sent: u64,
    /// Last delivery error
    pub last_error: Option<String>,
}

/// Event sink rendering events for the configured channels
pub struct Notifier<T: Transport> {
    config: NotifyConfig,
    transport: T,
    names: Box<dyn NameLookup>,
    stats: DispatchStats,
}

impl<T: Transport> Notifier<T> {
    /// Notifier with generated station and program names
    pub fn new(config: NotifyConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            names: Box::new(DefaultNames),
            stats: DispatchStats::default(),
        }
    }

    /// Use `names` for text, JSON and tags
    pub fn with_names(mut self, names: impl NameLookup + 'static) -> Self {
        self.names = Box::new(names);
        self
    }

    /// Channel configuration
    pub fn config(&self) -> &NotifyConfig {
        &self.config
    }

    /// Delivery counters
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// The transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The transport, mutable
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Messages one event turns into, in delivery order
    pub fn render(&self, event: &Event, at: Timestamp) -> Vec<(Target, String)> {
        let names = self.names.as_ref();
        let mut out = Vec::new();

        if let Some(ifttt) = &self.config.ifttt {
            let bit = EventMask::of(event.kind());
            if ifttt.mask.allows(event.kind()) {
                let body = json!({
                    "value1": format::text(event, at, names, self.config.utc_offset),
                    "value2": format::json(event, at, names),
                    "value3": format::value(event, at, names),
                });
                out.push((
                    Target {
                        channel: Channel::Ifttt,
                        url: format!(
                            "{}/trigger/{}/with/key/{}",
                            IFTTT_URL,
                            ifttt.event_name(bit),
                            ifttt.key
                        ),
                        auth: None,
                        content_type: "application/json",
                    },
                    body.to_string(),
                ));
            }
        }

        if let Some(influx) = &self.config.influx {
            out.push((
                Target {
                    channel: Channel::Influx,
                    url: format!(
                        "{}/write?db={}",
                        influx.url.trim_end_matches('/'),
                        influx.database
                    ),
                    auth: (!influx.token.is_empty()).then(|| format!("Token {}", influx.token)),
                    content_type: "text/plain; charset=utf-8",
                },
                format::influx(event, at, names),
            ));
        }

        if let Some(webhook) = &self.config.webhook {
            out.push((
                Target {
                    channel: Channel::Webhook,
                    url: webhook.url.clone(),
                    auth: None,
                    content_type: "application/json",
                },
                format::json(event, at, names).to_string(),
            ));
        }

        out
    }
}

impl<T: Transport> EventSink for Notifier<T> {
    fn emit(&mut self, event: Event, at: Timestamp) {
        self.stats.events += 1;
        let kind = event.kind();
        let messages = self.render(&event, at);
        if messages.is_empty() {
            self.stats.filtered += 1;
            return;
        }

        for (target, body) in messages {
            match self.transport.post(&target, &body) {
                Ok(()) => {
                    self.stats.sent += 1;
                    self.stats.bytes_sent += body.len() as u64;
                    log::debug!("{} sent to {:?}", kind.name(), target.channel);
                }
                Err(e) => {
                    self.stats.failed += 1;
                    log::warn!("{} to {:?} failed: {}", kind.name(), target.channel, e);
                    self.stats.last_error = Some(e.to_string());
                }
            }
        }
    }
}
