//! Irrigo Notify - rendering and routing controller events
//!
//! ## Overview
//!
//! The control core emits [`Event`](irrigo_core::Event)s through an
//! [`EventSink`](irrigo_core::EventSink) and does not care where they go.
//! This crate is one such sink: it renders every event in the formats
//! external services expect and hands the result to a [`Transport`].
//!
//! ```text
//!  Controller ──Event──▶ Notifier ──┬─ EventMask ─▶ text+JSON+value ──▶ Transport (IFTTT)
//!                                   ├─────────────▶ line protocol   ──▶ Transport (InfluxDB)
//!                                   └─────────────▶ JSON            ──▶ Transport (webhook)
//! ```
//!
//! ## Formats
//!
//! | Format | Function | Used for |
//! |--------|----------|----------|
//! | Text   | [`format::text`]   | push message (`value1`) |
//! | JSON   | [`format::json`]   | webhooks, `value2` |
//! | Value  | [`format::value`]  | single most relevant value (`value3`) |
//! | Influx | [`format::influx`] | InfluxDB line protocol |
//!
//! ## Event Mask
//!
//! The IFTTT channel only receives the events selected by an
//! [`EventMask`]. The bit layout matches the controller's stored
//! notification option byte, so an existing value can be reused as is:
//!
//! | Bit    | Events |
//! |--------|--------|
//! | `0x01` | program started |
//! | `0x02` | rain sensor on/off |
//! | `0x04` | flow update |
//! | `0x08` | water level |
//! | `0x10` | reboot complete |
//! | `0x20` | station run finished |
//!
//! Each bit can trigger its own maker event name. InfluxDB and the webhook
//! receive every event.
//!
//! ## Example Usage
//!
//! ```rust
//! use irrigo_notify::{NotifyConfig, Notifier, Target, Transport, NotifyError};
//!
//! struct Stdout;
//! impl Transport for Stdout {
//!     fn post(&mut self, target: &Target, body: &str) -> Result<(), NotifyError> {
//!         println!("{:?}: {}", target, body);
//!         Ok(())
//!     }
//! }
//!
//! let config = NotifyConfig::from_json(r#"{"ifttt": {"key": "abc", "mask": 48}}"#)?;
//! let notifier = Notifier::new(config, Stdout);
//! # let _ = notifier;
//! # Ok::<(), NotifyError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod dispatch;
pub mod format;

pub use config::{IftttConfig, InfluxConfig, NotifyConfig, WebhookConfig, IFTTT_DEFAULT_EVENT};
pub use dispatch::{Channel, DispatchStats, EventMask, Notifier, Target, Transport};
pub use format::{DefaultNames, NameLookup};

use thiserror::Error;

/// Errors from configuration loading and delivery
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Configuration could not be parsed
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// Configuration parsed but is not usable
    #[error("Configuration error: {0}")]
    Config(String),

    /// The transport failed to deliver a message
    #[error("Delivery failed: {0}")]
    Transport(String),
}
