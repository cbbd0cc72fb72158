use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{RelayError, Result};

fn timed_out(addr: SocketAddr, timeout: Duration, what: &str) -> RelayError {
    RelayError::Io(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        format!("{what} {addr} took longer than {timeout:?}"),
    ))
}

/// Opens a TCP connection to a relay.
pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| timed_out(addr, timeout, "connecting to"))??;
    debug!("Connected to {addr}");
    Ok(stream)
}

/// Reads the relay's response until it closes the connection.
pub async fn read_history(mut stream: TcpStream, timeout: Duration) -> Result<String> {
    let addr = stream.peer_addr()?;
    let reading = async {
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).await?;
        Ok::<_, RelayError>(std::str::from_utf8(&bytes)?.to_owned())
    };
    tokio::time::timeout(timeout, reading)
        .await
        .map_err(|_| timed_out(addr, timeout, "reading from"))?
}

/// Connects to a relay and reads its history until the relay closes.
pub async fn fetch(addr: SocketAddr, timeout: Duration) -> Result<String> {
    let stream = connect(addr, timeout).await?;
    read_history(stream, timeout).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_fetch_reads_until_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"Sunny\nRainy").await.unwrap();
        });

        let text = fetch(addr, Duration::from_secs(2)).await.unwrap();
        assert_eq!(text, "Sunny\nRainy");
    }

    #[tokio::test]
    async fn test_connect_succeeds_before_response_is_read() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (release, released) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = released.await;
            stream.write_all(b"Hail").await.unwrap();
        });

        // Connection is up while the relay has not written anything yet
        let stream = connect(addr, Duration::from_secs(2)).await.unwrap();
        release.send(()).unwrap();
        let text = read_history(stream, Duration::from_secs(2)).await.unwrap();
        assert_eq!(text, "Hail");
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        // Bind then drop to get a port nobody listens on
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let result = fetch(addr, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(RelayError::Io(_))));
    }
}
