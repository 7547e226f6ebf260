//! UDP syslog ingestion.
//!
//! [`Listener`] owns the socket and feeds every datagram to an [`Ingestor`],
//! which decodes it and records the reading in the [`Store`]. A datagram that
//! fails at any stage is logged and dropped; the loop always moves on to the
//! next one.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn, Instrument, Span};

use crate::error::{DecodeError, IngestError};
use crate::models::{RawReading, SensorIdentity};
use crate::store::Store;

pub mod syslog;

// ---

/// Largest datagram accepted. rtl_433 messages are well under 1 KiB.
const MAX_DATAGRAM: usize = 8 * 1024;

/// Decodes syslog datagrams into readings and records them.
#[derive(Clone)]
pub struct Ingestor {
    identity: Arc<SensorIdentity>,
    store: Arc<Store>,
}

impl Ingestor {
    // ---
    pub fn new(identity: Arc<SensorIdentity>, store: Arc<Store>) -> Self {
        Self { identity, store }
    }

    /// Decode and record one datagram. Returns the recorded sensor name.
    pub fn handle_datagram(&self, bytes: &[u8]) -> Result<String, IngestError> {
        // ---
        let text = std::str::from_utf8(bytes).map_err(DecodeError::from)?;
        let parts = syslog::parse(text).map_err(DecodeError::from)?;
        debug!(
            host = parts.hostname.unwrap_or("-"),
            app = parts.app_name.unwrap_or("-"),
            severity = parts.severity(),
            message = parts.message,
            "received syslog event"
        );

        let reading = RawReading::from_json(parts.message)?.to_reading(&self.identity)?;
        let name = reading.name.clone();
        self.store.record(reading)?;
        Ok(name)
    }
}

/// A bound syslog socket waiting to be run.
pub struct Listener {
    socket: UdpSocket,
    ingestor: Ingestor,
    span: Span,
}

impl Listener {
    // ---
    pub async fn bind(host: &str, port: u16, ingestor: Ingestor, span: Span) -> Result<Self> {
        // ---
        let bind = format!("{host}:{port}");
        let socket = UdpSocket::bind(&bind)
            .await
            .with_context(|| format!("Failed to bind syslog listener to {bind}"))?;
        span.in_scope(|| info!("launching syslog listener on {}", bind));
        Ok(Self {
            socket,
            ingestor,
            span,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive forever. Per-message failures never end the loop.
    pub async fn run(self) {
        // ---
        let span = self.span.clone();
        self.receive_loop().instrument(span).await
    }

    async fn receive_loop(self) {
        // ---
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(err) => {
                    warn!(error = %err, "syslog receive failed");
                    continue;
                }
            };

            match self.ingestor.handle_datagram(&buf[..len]) {
                Ok(name) => info!(%peer, "logging event for {}", name),
                Err(err) => warn!(%peer, error = %err, "dropping syslog message"),
            }
        }
    }
}
