//! Channel configuration
//!
//! Loaded from JSON. Every channel is optional; an empty object is a valid
//! configuration that delivers nothing.
//!
//! ```json
//! {
//!   "utc_offset": -18000,
//!   "ifttt":   { "key": "abc123", "mask": 49, "events": ["program", "rain"] },
//!   "influx":  { "url": "http://influx.local:8086", "database": "garden" },
//!   "webhook": { "url": "https://hooks.example.com/irrigo" }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::dispatch::EventMask;
use crate::NotifyError;

/// IFTTT maker channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IftttConfig {
    /// Maker webhook key
    pub key: String,
    /// Events delivered to this channel
    #[serde(default)]
    pub mask: EventMask,
    /// Maker event name per mask bit, lowest bit first
    ///
    /// Bits without a name use [`IFTTT_DEFAULT_EVENT`].
    #[serde(default)]
    pub events: Vec<String>,
}

/// Maker event name for bits without a configured one
pub const IFTTT_DEFAULT_EVENT: &str = "sprinkler";

impl IftttConfig {
    /// Maker event name for a single mask bit
    pub fn event_name(&self, bit: EventMask) -> &str {
        bit.position()
            .and_then(|i| self.events.get(i))
            .map(String::as_str)
            .filter(|name| !name.is_empty())
            .unwrap_or(IFTTT_DEFAULT_EVENT)
    }
}

/// InfluxDB write endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfluxConfig {
    /// Server base URL
    pub url: String,
    /// Destination database
    pub database: String,
    /// API token, sent as `Authorization: Token <token>`
    #[serde(default)]
    pub token: String,
}

/// Generic JSON webhook, receives every event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Destination URL
    pub url: String,
}

/// Notification channels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Local time offset from UTC in seconds, used in text messages
    #[serde(default)]
    pub utc_offset: i32,
    /// Push messages
    #[serde(default)]
    pub ifttt: Option<IftttConfig>,
    /// Time series
    #[serde(default)]
    pub influx: Option<InfluxConfig>,
    /// JSON webhook
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

fn check_url(channel: &str, url: &str) -> Result<(), NotifyError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(NotifyError::Config(format!(
            "{} url must start with http:// or https://",
            channel
        )))
    }
}

impl NotifyConfig {
    /// Parse and validate a JSON document
    pub fn from_json(text: &str) -> Result<Self, NotifyError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, NotifyError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the parts serde cannot
    pub fn validate(&self) -> Result<(), NotifyError> {
        // UTC-12 .. UTC+14
        if !(-12 * 3600..=14 * 3600).contains(&self.utc_offset) {
            return Err(NotifyError::Config(format!(
                "utc_offset {} out of range",
                self.utc_offset
            )));
        }
        if let Some(ifttt) = &self.ifttt {
            if ifttt.key.is_empty() {
                return Err(NotifyError::Config("ifttt key is empty".into()));
            }
        }
        if let Some(influx) = &self.influx {
            check_url("influx", &influx.url)?;
            if influx.database.is_empty() {
                return Err(NotifyError::Config("influx database is empty".into()));
            }
        }
        if let Some(webhook) = &self.webhook {
            check_url("webhook", &webhook.url)?;
        }
        Ok(())
    }

    /// Set the IFTTT channel
    pub fn with_ifttt(mut self, key: impl Into<String>, mask: EventMask) -> Self {
        self.ifttt = Some(IftttConfig {
            key: key.into(),
            mask,
            events: Vec::new(),
        });
        self
    }

    /// Set the InfluxDB channel
    pub fn with_influx(mut self, url: impl Into<String>, database: impl Into<String>) -> Self {
        self.influx = Some(InfluxConfig {
            url: url.into(),
            database: database.into(),
            token: String::new(),
        });
        self
    }

    /// Set the webhook channel
    pub fn with_webhook(mut self, url: impl Into<String>) -> Self {
        self.webhook = Some(WebhookConfig { url: url.into() });
        self
    }

    /// Set the local time offset (seconds)
    pub fn with_utc_offset(mut self, secs: i32) -> Self {
        self.utc_offset = secs;
        self
    }
}
