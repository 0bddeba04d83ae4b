//! # valvewatch
//!
//! A resilient ingestion client for real-time valve and pressure telemetry.
//!
//! The client holds a WebSocket connection to a telemetry feed, decodes each
//! frame into a [`CanonicalReading`], validates it, batches readings and
//! hands them to a [`Consumer`] along with threshold alerts, connection
//! state changes and diagnostic log events.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     ConnectionManager task                   │
//! │                                                              │
//! │  Transport ──frames──▶ pipeline ──────────▶ data            │
//! │  (websocket)           normalize            batch, window,   │
//! │      ▲                 validate             alerts, metrics  │
//! │      │                 coil tracking             │           │
//! │  connection ◀── timers (heartbeat, backoff,      ▼           │
//! │  (endpoints,    flush, coil hold)             Consumer ──────┼──▶ app
//! │   failover)                                                  │
//! └───────▲──────────────────────────────────────────────────────┘
//!         │ commands / watch channels
//!  ConnectionHandle
//! ```
//!
//! - **[`config`]**: Layered configuration (defaults, file, `VALVEWATCH_*` env)
//! - **[`transport`]**: The [`Transport`] seam and its WebSocket implementation
//! - **[`pipeline`]**: Sans-IO frame processing, from envelope to canonical reading
//! - **[`data`]**: Batching, the display window, alert thresholds and metrics
//! - **[`connection`]**: The manager task, backoff, endpoint rotation and timers
//! - **[`consumer`]**: Where readings, alerts and status changes are delivered
//! - **[`events`]**: The bounded diagnostic log
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Connect to the default endpoints
//! valvewatch
//!
//! # Connect to a specific feed, holding coil changes for 5 seconds
//! valvewatch --endpoint ws://10.0.0.5:1880/ws/dados --coil-hold 5s
//! ```
//!
//! ### As a library with a channel consumer
//!
//! ```no_run
//! use std::sync::Arc;
//! use valvewatch::{ChannelConsumer, ClientConfig, ConnectionManager, Update, WebSocketTransport};
//!
//! # tokio_test::block_on(async {
//! let config = ClientConfig::load(None).unwrap();
//! let (consumer, mut feed) = ChannelConsumer::create();
//! let (handle, _task) = ConnectionManager::spawn(
//!     config,
//!     Arc::new(WebSocketTransport::new()),
//!     Box::new(consumer),
//! );
//!
//! while let Some(update) = feed.recv().await {
//!     if let Update::Batch(readings) = update {
//!         println!("{} readings", readings.len());
//!     }
//! }
//! # handle.shutdown().unwrap();
//! # });
//! ```
//!
//! ### Running the pipeline without a connection
//!
//! ```
//! use std::time::Instant;
//! use serde_json::json;
//! use valvewatch::{ClientConfig, Pipeline};
//!
//! let mut pipeline = Pipeline::new(&ClientConfig::default());
//! let inner = json!({ "temperatura": 24.5, "pressaoEntrada": 6.2, "pressaoSaida1": 4.1 });
//! pipeline.ingest(&json!({ "payload": inner.to_string() }), Instant::now(), 0);
//!
//! let flushed = pipeline.flush(0).unwrap();
//! assert_eq!(flushed.readings[0].temperature, 24.5);
//! ```

pub mod config;
pub mod connection;
pub mod consumer;
pub mod data;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod transport;

// Re-export main types for convenience
pub use config::{ClientConfig, CoilPolicy};
pub use connection::{ConnectionHandle, ConnectionManager, WindowView};
pub use consumer::{
    ChannelConsumer, Collected, CollectingConsumer, Consumer, NullConsumer, Update, UpdateFeed,
};
pub use data::{AlertEvent, AlertThresholds, WindowStats};
pub use error::{
    ConfigError, EndpointError, NormalizeError, Stopped, TransportError, ValidationError,
};
pub use events::{DebugEvent, DebugLog};
pub use pipeline::{Flushed, Ingest, Pipeline};
pub use transport::{Transport, WebSocketTransport};
pub use valvewatch_types::{
    CanonicalReading, ConnectionMetrics, ConnectionQuality, ConnectionState, EventCategory,
    HealthStatus, ReadingStatus, Severity,
};
