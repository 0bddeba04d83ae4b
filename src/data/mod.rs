//! Buffering, windowing, metrics and alerting for accepted readings.
//!
//! ## Submodules
//!
//! - [`alert`]: Threshold tables and the per-reading [`AlertEvaluator`]
//! - [`batch`]: The pending queue drained on each flush
//! - [`duration`]: Parsing and formatting of duration strings (e.g., "75ms", "18s")
//! - [`metrics`]: Latency, rate and memory tracking behind `ConnectionMetrics`
//! - [`window`]: The bounded display window and its statistics
//!
//! ## Data Flow
//!
//! ```text
//! validated reading
//!        │
//!        ▼
//! BatchBuffer::push()            (O(1), never blocks)
//!        │  flush: timer tick, high-water mark, or close
//!        ▼
//! RollingWindow::extend()        (FIFO eviction past capacity)
//!        │
//!        ├──▶ AlertEvaluator::evaluate()   (once per reading, in order)
//!        │
//!        └──▶ MetricsRecorder::record_batch()
//! ```

pub mod alert;
pub mod batch;
pub mod duration;
pub mod metrics;
pub mod window;

pub use alert::{classify, AlertEvaluator, AlertEvent, AlertThresholds, ChannelThresholds};
pub use batch::BatchBuffer;
pub use metrics::MetricsRecorder;
pub use window::{RollingWindow, WindowStats};
