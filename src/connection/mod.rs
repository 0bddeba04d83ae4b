//! Connection lifecycle: connect, heartbeat, reconnect and failover.
//!
//! ```text
//!                 connect()
//! Disconnected ─────────────▶ Connecting ──open──▶ Open
//!      ▲  ▲                       │                 │
//!      │  │      timeout / error  │                 │ close / error
//!      │  └───────────────────────┴─────────────────┘
//!      │                          │ auto-reconnect, attempts left
//!      │                          ▼
//!      └──── manual close ── ReconnectScheduled ──timer──▶ connect()
//! ```
//!
//! When the attempts for an endpoint run out the manager fails over to the
//! next configured endpoint. Once every endpoint has been abandoned without
//! a successful open in between, it stays disconnected until a manual
//! reconnect or endpoint change.

pub mod backoff;
pub mod endpoints;
mod handle;
mod manager;
pub mod scheduler;

pub use backoff::Backoff;
pub use endpoints::EndpointList;
pub use handle::{ConnectionHandle, WindowView};
pub use manager::ConnectionManager;
