//! TCP side of the relay: connect, receive one blob, disconnect.
//!
//! Each accepted connection gets its own task so that a stalled client never
//! holds up the accept loop. Nothing is ever read from the client.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::{RelayError, Result};
use crate::history::{render, SharedHistory};

const LISTEN_BACKLOG: u32 = 128;

pub struct HistoryServer {
    listener: TcpListener,
    history: SharedHistory,
    placeholder: Arc<str>,
}

impl HistoryServer {
    /// Binds and listens on `addr` with `SO_REUSEADDR`. Failure is fatal.
    pub fn bind(addr: SocketAddr, history: SharedHistory, placeholder: &str) -> Result<Self> {
        let listener = listen(addr).map_err(|source| RelayError::Bind { addr, source })?;
        info!("History server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            history,
            placeholder: Arc::from(placeholder),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(RelayError::from)
    }

    /// Accept loop, runs until `shutdown` is cancelled. Handlers already
    /// spawned finish on their own.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        loop {
            let accepted = select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {e}");
                    continue;
                }
            };

            info!("Client connected: {peer}");
            tokio::spawn(
                {
                    let history = self.history.clone();
                    let placeholder = self.placeholder.clone();
                    async move {
                        match serve_history(stream, &history, &placeholder).await {
                            Ok(written) => debug!("Sent {written} bytes"),
                            Err(e) => warn!("Failed to serve client: {e}"),
                        }
                    }
                }
                .instrument(info_span!("connection", peer = %peer)),
            );
        }
        info!("History server stopped");
        Ok(())
    }
}

fn listen(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

/// Writes a snapshot of the history to `stream` and closes the write side.
/// Returns the number of bytes written.
pub async fn serve_history(
    mut stream: TcpStream,
    history: &SharedHistory,
    placeholder: &str,
) -> Result<usize> {
    // Clone under the read lock; the lock is released before any I/O
    let snapshot = history.read().await.snapshot();
    let text = render(&snapshot, placeholder);

    stream.write_all(text.as_bytes()).await?;
    if let Err(e) = stream.shutdown().await {
        warn!("Failed to close connection cleanly: {e}");
    }
    Ok(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryBuffer;
    use crate::message::Message;
    use tokio::io::AsyncReadExt;

    async fn fetch(addr: SocketAddr) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut text = String::new();
        stream.read_to_string(&mut text).await.unwrap();
        text
    }

    #[tokio::test]
    async fn test_serves_placeholder_then_history() {
        let history = HistoryBuffer::shared(5).unwrap();
        let server =
            HistoryServer::bind("127.0.0.1:0".parse().unwrap(), history.clone(), "No messages")
                .unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.run(shutdown.clone()));

        assert_eq!(fetch(addr).await, "No messages");

        {
            let mut locked = history.write().await;
            for text in ["A", "B", "C"] {
                locked.push(Message::new(text));
            }
        }
        assert_eq!(fetch(addr).await, "A\nB\nC");

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let history = HistoryBuffer::shared(5).unwrap();
        let first =
            HistoryServer::bind("127.0.0.1:0".parse().unwrap(), history.clone(), "-").unwrap();
        let taken = first.local_addr().unwrap();
        // Listening socket still open, so a second listener must fail
        let second = HistoryServer::bind(taken, history, "-");
        assert!(matches!(second, Err(RelayError::Bind { .. })));
    }
}
