//! Pending-reading queue drained on each flush.

use valvewatch_types::CanonicalReading;

/// Validated readings waiting for the next flush.
///
/// Appending never blocks and never drops; pressure is relieved by flushing
/// early, not by discarding.
#[derive(Debug, Default)]
pub struct BatchBuffer {
    queue: Vec<CanonicalReading>,
}

impl BatchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, reading: CanonicalReading) {
        self.queue.push(reading);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Take every queued reading, in insertion order.
    pub fn drain(&mut self) -> Vec<CanonicalReading> {
        std::mem::take(&mut self.queue)
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(temperature: f64) -> CanonicalReading {
        CanonicalReading {
            temperature,
            ..Default::default()
        }
    }

    #[test]
    fn test_drain_preserves_order_and_empties() {
        let mut buffer = BatchBuffer::new();
        for t in [1.0, 2.0, 3.0] {
            buffer.push(reading(t));
        }

        let drained: Vec<_> = buffer.drain().iter().map(|r| r.temperature).collect();
        assert_eq!(drained, vec![1.0, 2.0, 3.0]);
        assert!(buffer.is_empty());
        assert!(buffer.drain().is_empty());
    }
}
