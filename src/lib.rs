//! Bridge WH31E sensor telemetry from rtl_433 syslog datagrams into a
//! Prometheus scrape endpoint.
//!
//! Modules, leaf-first:
//! - `models`   – `Reading`, the wire payload, and the sensor id → name table
//! - `clock`    – time source used for windowing
//! - `store`    – latest-value table and windowed arrival counts (the core)
//! - `metrics`  – exposition-format rendering and fail-closed validation
//! - `listener` – UDP syslog framing, decoding, and the receive loop
//! - `routes`   – `/metrics` and `/health`
//! - `config`   – environment and file configuration
//!
//! The main types are re-exported at the crate root for the binary and the
//! integration tests.

pub mod clock;
pub mod config;
pub mod error;
pub mod listener;
pub mod metrics;
pub mod models;
pub mod routes;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{DecodeError, IngestError, MetricError, StoreError, SyslogError};
pub use listener::{Ingestor, Listener};
pub use metrics::Validator;
pub use models::{RawReading, Reading, SensorIdentity};
pub use store::{Snapshot, Store, StoreConfig};
