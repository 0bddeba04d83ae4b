//! Consumer callbacks.
//!
//! The connection manager pushes everything it produces through a
//! [`Consumer`]: flushed batches, state transitions, alerts and diagnostic
//! log entries. Displays, loggers and tests implement the trait; every
//! method has a no-op default so a consumer only handles what it needs.
//!
//! Two ready-made consumers are provided:
//!
//! - [`ChannelConsumer`]: forwards updates over a channel to another task
//! - [`CollectingConsumer`]: accumulates updates behind a shared handle

mod channel;
mod collect;

pub use channel::{ChannelConsumer, Update, UpdateFeed};
pub use collect::{Collected, CollectingConsumer};

use valvewatch_types::{CanonicalReading, ConnectionState};

use crate::data::AlertEvent;
use crate::events::DebugEvent;

/// Receiver of connection manager output.
///
/// Called from the connection manager's task; implementations should return
/// quickly.
pub trait Consumer: Send {
    /// A batch of readings was flushed into the display window.
    fn on_batch(&mut self, _readings: &[CanonicalReading]) {}

    fn on_status_change(&mut self, _state: ConnectionState) {}

    fn on_alert(&mut self, _alert: &AlertEvent) {}

    fn on_debug_log(&mut self, _event: &DebugEvent) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullConsumer;

impl Consumer for NullConsumer {}
