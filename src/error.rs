//! Error types for the wh31e exporter.
//!
//! The application edge (`main`, config loading, socket binding) works in
//! `anyhow::Result`. Everything below it reports one of these typed errors so
//! callers can decide per variant whether to drop, reject, or fail closed.

use chrono::{DateTime, Utc};
use thiserror::Error;

// ---

/// Malformed RFC 5424 framing.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SyslogError {
    // ---
    #[error("empty datagram")]
    Empty,

    #[error("missing or malformed priority field")]
    BadPriority,

    #[error("missing or malformed version field")]
    BadVersion,

    #[error("header truncated before {0}")]
    Truncated(&'static str),

    #[error("unterminated structured data element")]
    UnterminatedStructuredData,

    #[error("structured data must be '-' or start with '['")]
    BadStructuredData,
}

/// A datagram that could not be turned into a [`crate::Reading`].
#[derive(Error, Debug)]
pub enum DecodeError {
    // ---
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("invalid syslog framing: {0}")]
    Syslog(#[from] SyslogError),

    #[error("invalid reading payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid reading timestamp '{value}': {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// A well-formed reading the store refused to record.
#[derive(Error, Debug, PartialEq)]
pub enum StoreError {
    // ---
    #[error("reading for '{name}' at {timestamp} is more than {max_skew_secs}s away from {now}")]
    TimestampSkew {
        name: String,
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
        max_skew_secs: i64,
    },
}

/// Any per-message failure on the ingestion path.
#[derive(Error, Debug)]
pub enum IngestError {
    // ---
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A metric that failed exposition-format validation.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MetricError {
    // ---
    #[error("invalid metric name: {0}")]
    InvalidName(String),

    #[error("invalid metric type: {kind} ({metric})")]
    InvalidType { metric: String, kind: String },

    #[error("invalid metric value: {value} ({metric})")]
    InvalidValue { metric: String, value: String },

    #[error("invalid metric tag key: {key} ({metric})")]
    InvalidTagKey { metric: String, key: String },

    #[error("invalid metric tag value: {value} ({metric})")]
    InvalidTagValue { metric: String, value: String },
}
