//! A consumer that keeps everything it receives.

use std::sync::Arc;

use parking_lot::Mutex;
use valvewatch_types::{CanonicalReading, ConnectionState};

use super::Consumer;
use crate::data::AlertEvent;
use crate::events::DebugEvent;

/// Everything a [`CollectingConsumer`] has seen.
#[derive(Debug, Default, Clone)]
pub struct Collected {
    pub batches: Vec<Vec<CanonicalReading>>,
    pub states: Vec<ConnectionState>,
    pub alerts: Vec<AlertEvent>,
    pub logs: Vec<DebugEvent>,
}

impl Collected {
    /// All readings across batches, in delivery order.
    pub fn readings(&self) -> Vec<&CanonicalReading> {
        self.batches.iter().flatten().collect()
    }
}

/// Accumulates updates behind a shared handle.
///
/// Clones share the same storage, so one clone can be handed to the
/// connection manager while another is inspected.
#[derive(Debug, Default, Clone)]
pub struct CollectingConsumer {
    inner: Arc<Mutex<Collected>>,
}

impl CollectingConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything collected so far.
    pub fn snapshot(&self) -> Collected {
        self.inner.lock().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&Collected) -> R) -> R {
        f(&self.inner.lock())
    }
}

impl Consumer for CollectingConsumer {
    fn on_batch(&mut self, readings: &[CanonicalReading]) {
        self.inner.lock().batches.push(readings.to_vec());
    }

    fn on_status_change(&mut self, state: ConnectionState) {
        self.inner.lock().states.push(state);
    }

    fn on_alert(&mut self, alert: &AlertEvent) {
        self.inner.lock().alerts.push(alert.clone());
    }

    fn on_debug_log(&mut self, event: &DebugEvent) {
        self.inner.lock().logs.push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_storage() {
        let collector = CollectingConsumer::new();
        let mut handed_off = collector.clone();

        handed_off.on_status_change(ConnectionState::Connecting);
        handed_off.on_batch(&[CanonicalReading::default(), CanonicalReading::default()]);

        let seen = collector.snapshot();
        assert_eq!(seen.states, vec![ConnectionState::Connecting]);
        assert_eq!(seen.readings().len(), 2);
        assert_eq!(collector.with(|c| c.batches.len()), 1);
    }
}
