//! Push-on-change multicast publisher.
//!
//! Polls a [`TextSource`] on a fixed interval and sends the value as a single
//! datagram whenever it differs from the last value sent. There is no
//! acknowledgment and no retry beyond the next tick.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::select;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PublisherConfig;
use crate::error::{RelayError, Result};
use crate::history::LastValue;
use crate::message::{Message, MAX_DATAGRAM_PAYLOAD};

/// Something the publisher can poll for the current text.
pub trait TextSource {
    fn read(&self) -> std::io::Result<String>;
}

impl<F> TextSource for F
where
    F: Fn() -> std::io::Result<String>,
{
    fn read(&self) -> std::io::Result<String> {
        self()
    }
}

/// Reads a whole UTF-8 file and trims surrounding whitespace.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TextSource for FileSource {
    fn read(&self) -> std::io::Result<String> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(content.trim().to_string())
    }
}

pub struct Publisher<S> {
    socket: UdpSocket,
    target: SocketAddr,
    source: S,
    fallback: Message,
    last_sent: LastValue,
}

impl<S: TextSource> Publisher<S> {
    /// Binds an ephemeral UDP socket configured for multicast sends.
    pub async fn new(config: &PublisherConfig, source: S) -> Result<Self> {
        config.validate()?;
        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: bind_addr,
                source,
            })?;
        socket.set_multicast_ttl_v4(config.multicast_ttl)?;
        Ok(Self::with_socket(
            socket,
            config.target(),
            source,
            Message::new(config.fallback_message.clone()),
        ))
    }

    /// Uses an already bound socket. `target` does not have to be a group.
    pub fn with_socket(socket: UdpSocket, target: SocketAddr, source: S, fallback: Message) -> Self {
        Self {
            socket,
            target,
            source,
            fallback,
            last_sent: LastValue::new(),
        }
    }

    /// Current source value, or the fallback if the source cannot be read.
    pub fn read_current(&self) -> Message {
        match self.source.read() {
            Ok(text) => Message::new(text),
            Err(e) => {
                warn!("Could not read text source, using fallback: {e}");
                self.fallback.clone()
            }
        }
    }

    /// Reads the source once and sends it if it changed. Returns whether a
    /// datagram was sent.
    pub async fn poll_once(&mut self) -> Result<bool> {
        let current = self.read_current();
        if !self.last_sent.differs(&current) {
            debug!("Value unchanged, nothing to send");
            return Ok(false);
        }

        let payload = match current.truncated(MAX_DATAGRAM_PAYLOAD) {
            Some(cut) => {
                warn!(
                    "Message of {} bytes exceeds datagram limit, truncating to {} bytes",
                    current.len(),
                    cut.len()
                );
                cut
            }
            None => current.clone(),
        };

        self.socket.send_to(payload.as_bytes(), self.target).await?;
        info!("Sent to {}: {}", self.target, payload);
        self.last_sent.update(&current);
        Ok(true)
    }

    /// Polls every `interval` until `shutdown` is cancelled. The first poll
    /// happens immediately.
    pub async fn run(mut self, interval: Duration, shutdown: CancellationToken) -> Result<()> {
        info!("Publisher started: {} every {:?}", self.target, interval);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        // Not recorded as sent, so the next tick retries
                        warn!("Failed to send to {}: {e}", self.target);
                    }
                }
            }
        }

        info!("Publisher stopped");
        Ok(())
    }

    pub fn last_sent(&self) -> &Message {
        self.last_sent.get()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(RelayError::from)
    }
}
