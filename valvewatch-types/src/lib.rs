//! # valvewatch-types
//!
//! Core types shared between the valvewatch ingestion client and whatever
//! consumes its output (dashboards, loggers, exporters).
//!
//! ## Design Goals
//!
//! - **Zero required dependencies**: Core types work without any serialization framework
//! - **Optional serialization**: Enable the `serde` feature for JSON and friends
//! - **Display agnostic**: Nothing in here knows how a reading gets drawn
//!
//! ## Features
//!
//! - `std` (default): Standard library support
//! - `serde`: Serialization via serde
//!
//! ## Example
//!
//! ```rust
//! use valvewatch_types::{CanonicalReading, ConnectionQuality, ReadingStatus};
//!
//! let reading = CanonicalReading {
//!     temperature: 22.5,
//!     inlet_pressure: 4.1,
//!     ..CanonicalReading::default()
//! };
//! assert_eq!(reading.status, ReadingStatus::Normal);
//! assert_eq!(reading.coil_in_use, "none");
//!
//! assert_eq!(ConnectionQuality::from_signals(150, 0), ConnectionQuality::Good);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod metrics;
mod reading;
mod status;

pub use metrics::*;
pub use reading::*;
pub use status::*;
