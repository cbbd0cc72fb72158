//! Multicast subscriber side of the relay.
//!
//! Receives datagrams, drops the ones that are not UTF-8, and appends a message
//! to the shared history only when it differs from the last observed one.

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{RelayError, Result};
use crate::history::{LastValue, SharedHistory};
use crate::message::Message;

const RECV_BUFFER_SIZE: usize = 65_536;

pub struct Subscriber {
    socket: UdpSocket,
    history: SharedHistory,
    last_observed: LastValue,
}

impl Subscriber {
    /// Binds `0.0.0.0:<port>` and joins `group` on `interface`.
    ///
    /// Both steps are fatal on failure.
    pub async fn join(
        group: Ipv4Addr,
        port: u16,
        interface: Ipv4Addr,
        history: SharedHistory,
    ) -> Result<Self> {
        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
        let socket = bind_reusable(bind_addr).map_err(|source| RelayError::Bind {
            addr: bind_addr,
            source,
        })?;
        socket
            .join_multicast_v4(group, interface)
            .map_err(|source| RelayError::JoinMulticast {
                group,
                interface,
                source,
            })?;
        info!("Joined multicast group {group} on {interface}, port {port}");
        Ok(Self::from_socket(socket, history))
    }

    /// Receives on an already bound socket, multicast or not.
    pub fn from_socket(socket: UdpSocket, history: SharedHistory) -> Self {
        Self {
            socket,
            history,
            last_observed: LastValue::new(),
        }
    }

    /// Processes one datagram payload. Returns whether the history changed;
    /// fails only if the payload is not UTF-8, in which case nothing changes.
    pub async fn handle_datagram(&mut self, payload: &[u8]) -> Result<bool> {
        let message = Message::from_datagram(payload)?;
        if !self.last_observed.update(&message) {
            trace!("Duplicate message ignored");
            return Ok(false);
        }

        let evicted = {
            let mut history = self.history.write().await;
            history.push(message.clone())
        };
        if let Some(evicted) = evicted {
            debug!("Evicted oldest message: {evicted}");
        }
        info!("New message: {message}");
        Ok(true)
    }

    /// Receive loop, runs until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            let received = select! {
                _ = shutdown.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => received,
            };

            let (len, from) = match received {
                Ok(received) => received,
                Err(e) => {
                    warn!("Failed to receive datagram: {e}");
                    continue;
                }
            };

            if let Err(e) = self.handle_datagram(&buf[..len]).await {
                warn!("Dropping datagram from {from}: {e}");
            }
        }
        info!("Subscriber stopped");
        Ok(())
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(RelayError::from)
    }
}

/// Binds a UDP socket with `SO_REUSEADDR` so several relays on one host can
/// share the group port.
pub fn bind_reusable(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryBuffer;

    async fn subscriber(capacity: usize) -> (Subscriber, SharedHistory) {
        let history = HistoryBuffer::shared(capacity).unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        (Subscriber::from_socket(socket, history.clone()), history)
    }

    async fn texts(history: &SharedHistory) -> Vec<String> {
        history
            .read()
            .await
            .snapshot()
            .into_iter()
            .map(Message::into_string)
            .collect()
    }

    #[tokio::test]
    async fn test_dedup_by_last_observed() {
        let (mut sub, history) = subscriber(5).await;
        for payload in ["A", "A", "B", "B", "B", "C"] {
            sub.handle_datagram(payload.as_bytes()).await.unwrap();
        }
        assert_eq!(texts(&history).await, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_leaves_history_untouched() {
        let (mut sub, history) = subscriber(5).await;
        assert!(sub.handle_datagram(b"Sunny").await.unwrap());
        assert!(matches!(
            sub.handle_datagram(&[0xc3, 0x28]).await,
            Err(RelayError::InvalidUtf8(_))
        ));
        assert_eq!(texts(&history).await, vec!["Sunny"]);
        // The bad datagram is not remembered as last observed either
        assert!(!sub.handle_datagram(b"Sunny").await.unwrap());
        assert!(sub.handle_datagram(b"Rainy").await.unwrap());
    }

    #[tokio::test]
    async fn test_two_subscribers_share_a_port() {
        let first = bind_reusable("0.0.0.0:0".parse().unwrap()).unwrap();
        let port = first.local_addr().unwrap().port();
        let shared: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
        let second = bind_reusable(shared).unwrap();
        assert_eq!(second.local_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn test_reusable_socket_receives() {
        let history = HistoryBuffer::shared(5).unwrap();
        let socket = bind_reusable("127.0.0.1:0".parse().unwrap()).unwrap();
        let target = socket.local_addr().unwrap();
        let sub = Subscriber::from_socket(socket, history.clone());
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(sub.run(shutdown.clone()));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"Humid", target).await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while history.read().await.is_empty() {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(texts(&history).await, vec!["Humid"]);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_eviction_through_subscriber() {
        let (mut sub, history) = subscriber(2).await;
        for payload in ["A", "B", "C"] {
            sub.handle_datagram(payload.as_bytes()).await.unwrap();
        }
        assert_eq!(texts(&history).await, vec!["B", "C"]);
    }
}
