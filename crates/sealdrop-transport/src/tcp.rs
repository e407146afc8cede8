//! TCP connections with length-prefixed framing.
//!
//! TCP already guarantees ordered, reliable delivery; framing only restores
//! message boundaries on top of the byte stream. Each frame is prefixed with
//! a 4-byte big-endian length header:
//!
//! ```text
//! +------------------+------------------+
//! | Length (4 bytes) | Payload (N bytes)|
//! +------------------+------------------+
//! ```

use crate::MAX_FRAME_SIZE;
use crate::transport::{Connection, TransportError, TransportResult, TransportStats};
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

/// Framed TCP connection to a single peer.
///
/// # Examples
///
/// ```no_run
/// use sealdrop_transport::tcp::TcpConnection;
/// use sealdrop_transport::transport::Connection;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut conn = TcpConnection::connect("127.0.0.1:7878").await?;
/// conn.send_frame(b"hello").await?;
/// let reply = conn.recv_frame().await?;
/// # Ok(())
/// # }
/// ```
pub struct TcpConnection {
    stream: TcpStream,
    peer_addr: Option<SocketAddr>,
    closed: bool,
    stats: TransportStats,
}

impl TcpConnection {
    /// Connect to a listening peer.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ConnectionFailed` if the connection cannot be
    /// established.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> TransportResult<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already connected stream.
    #[must_use]
    pub fn from_stream(stream: TcpStream) -> Self {
        // Stop-and-wait sends one small frame per round trip
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY: {}", e);
        }
        let peer_addr = stream.peer_addr().ok();
        Self {
            stream,
            peer_addr,
            closed: false,
            stats: TransportStats::default(),
        }
    }

    /// Write a length-prefixed frame to a TCP stream.
    async fn write_framed(stream: &mut TcpStream, data: &[u8]) -> TransportResult<()> {
        if data.len() > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: data.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        let len = data.len() as u32;
        stream.write_all(&len.to_be_bytes()).await?;
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Read a length-prefixed frame from a TCP stream.
    async fn read_framed(stream: &mut TcpStream) -> TransportResult<Vec<u8>> {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.map_err(eof_as_closed)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await?;
        Ok(buf)
    }
}

/// A peer hanging up between frames is an orderly close, not an I/O failure.
fn eof_as_closed(e: io::Error) -> TransportError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        TransportError::Closed
    } else {
        TransportError::Io(e)
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn send_frame(&mut self, frame: &[u8]) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        Self::write_framed(&mut self.stream, frame).await?;
        self.stats.record_send(frame.len());
        Ok(())
    }

    async fn recv_frame(&mut self) -> TransportResult<Vec<u8>> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let frame = Self::read_framed(&mut self.stream).await?;
        self.stats.record_recv(frame.len());
        Ok(frame)
    }

    async fn close(&mut self) -> TransportResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.stream.shutdown().await {
            Ok(()) => Ok(()),
            // Peer already gone
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}

/// Listening side: accepts one [`TcpConnection`] per incoming peer.
pub struct TcpAcceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpAcceptor {
    /// Bind a listener. Use port 0 for an OS-assigned port.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::BindFailed` if the TCP listener cannot be created.
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> TransportResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the next peer.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if accepting fails.
    pub async fn accept(&self) -> TransportResult<TcpConnection> {
        let (stream, peer) = self.listener.accept().await?;
        tracing::debug!("Accepted TCP connection from {}", peer);
        Ok(TcpConnection::from_stream(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn connected_pair() -> (TcpConnection, TcpConnection) {
        let acceptor = TcpAcceptor::bind("127.0.0.1:0").await.unwrap();
        let addr = acceptor.local_addr();
        let (server, client) = tokio::join!(acceptor.accept(), TcpConnection::connect(addr));
        (server.unwrap(), client.unwrap())
    }

    #[tokio::test]
    async fn test_tcp_bind() {
        let acceptor = TcpAcceptor::bind("127.0.0.1:0").await.unwrap();
        assert_ne!(acceptor.local_addr().port(), 0);
        assert!(acceptor.local_addr().is_ipv4());
    }

    #[tokio::test]
    async fn test_tcp_send_recv() {
        let (mut server, mut client) = connected_pair().await;

        client.send_frame(b"Hello TCP!").await.unwrap();
        let received = timeout(Duration::from_secs(2), server.recv_frame())
            .await
            .expect("Timeout")
            .unwrap();
        assert_eq!(&received, b"Hello TCP!");

        server.send_frame(b"ack").await.unwrap();
        assert_eq!(client.recv_frame().await.unwrap(), b"ack");
    }

    #[tokio::test]
    async fn test_tcp_preserves_frame_boundaries() {
        let (mut server, mut client) = connected_pair().await;

        client.send_frame(b"one").await.unwrap();
        client.send_frame(b"").await.unwrap();
        client.send_frame(b"three").await.unwrap();

        assert_eq!(server.recv_frame().await.unwrap(), b"one");
        assert!(server.recv_frame().await.unwrap().is_empty());
        assert_eq!(server.recv_frame().await.unwrap(), b"three");
    }

    #[tokio::test]
    async fn test_tcp_large_frame() {
        let (mut server, mut client) = connected_pair().await;
        let large = vec![0xBB; 1024 * 1024];
        let expected = large.clone();

        let send = tokio::spawn(async move {
            client.send_frame(&large).await.unwrap();
            client
        });
        let received = server.recv_frame().await.unwrap();
        assert_eq!(received, expected);
        send.await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_oversized_frame_rejected() {
        let (_server, mut client) = connected_pair().await;
        let huge = vec![0u8; MAX_FRAME_SIZE + 1];
        let result = client.send_frame(&huge).await;
        assert!(matches!(result, Err(TransportError::FrameTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_tcp_peer_close_reports_closed() {
        let (mut server, mut client) = connected_pair().await;
        client.close().await.unwrap();
        drop(client);

        let result = server.recv_frame().await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_tcp_send_after_close() {
        let (_server, mut client) = connected_pair().await;
        client.close().await.unwrap();
        client.close().await.unwrap();

        let result = client.send_frame(b"late").await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_tcp_stats() {
        let (mut server, mut client) = connected_pair().await;

        client.send_frame(b"stats test").await.unwrap();
        server.recv_frame().await.unwrap();

        assert_eq!(client.stats().frames_sent, 1);
        assert_eq!(client.stats().bytes_sent, 10);
        assert_eq!(server.stats().frames_received, 1);
        assert_eq!(server.stats().bytes_received, 10);
        assert!(server.peer_addr().is_some());
    }

    #[tokio::test]
    async fn test_tcp_connect_refused() {
        // Bind then drop to get a port with nothing listening
        let addr = {
            let acceptor = TcpAcceptor::bind("127.0.0.1:0").await.unwrap();
            acceptor.local_addr()
        };
        let result = TcpConnection::connect(addr).await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }
}
