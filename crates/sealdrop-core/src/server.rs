//! TCP receive server.
//!
//! Each accepted connection gets its own task and its own
//! [`ReceiverSession`]; sessions share nothing but the private key and the
//! output directory.

use crate::channel::MessageChannel;
use crate::error::Result;
use crate::receiver::{ReceiveOutcome, ReceiverConfig, ReceiverSession};
use sealdrop_crypto::PrivateKey;
use sealdrop_transport::{Connection, TcpAcceptor};
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::ToSocketAddrs;

/// Pause before accepting again after a failed accept.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Per-session receiver settings
    pub receiver: ReceiverConfig,
    /// Drop a connection whose sender stays silent this long
    pub idle_timeout: Option<Duration>,
}

/// Accepts connections and runs one receive session per connection.
pub struct Server {
    acceptor: TcpAcceptor,
    private_key: Arc<PrivateKey>,
    config: ServerConfig,
}

impl Server {
    /// Bind to `addr`.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the address cannot be bound.
    pub async fn bind(
        addr: impl ToSocketAddrs,
        private_key: Arc<PrivateKey>,
        config: ServerConfig,
    ) -> Result<Self> {
        let acceptor = TcpAcceptor::bind(addr).await?;
        Ok(Self {
            acceptor,
            private_key,
            config,
        })
    }

    /// Address the server is listening on.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.acceptor.local_addr()
    }

    /// Accept one connection and run its session to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if accepting fails or the session ends in error.
    pub async fn serve_one(&self) -> Result<ReceiveOutcome> {
        let conn = self.acceptor.accept().await?;
        receive_on(conn, Arc::clone(&self.private_key), &self.config).await
    }

    /// Accept connections forever, one task per connection.
    ///
    /// Session failures are logged and do not stop the server. The future
    /// never completes; drop it to stop accepting.
    pub async fn run(self) {
        tracing::info!("Listening on {}", self.local_addr());

        loop {
            let conn = accept_with_backoff(|| self.acceptor.accept()).await;
            let peer = conn
                .peer_addr()
                .map_or_else(|| "unknown".to_string(), |a| a.to_string());
            let key = Arc::clone(&self.private_key);
            let config = self.config.clone();

            tokio::spawn(async move {
                tracing::info!("Connection from {}", peer);
                match receive_on(conn, key, &config).await {
                    Ok(ReceiveOutcome::Completed(file)) => tracing::info!(
                        "{}: received {} ({} bytes, {} chunks), digest {}",
                        peer,
                        file.path.display(),
                        file.file_size,
                        file.chunk_count,
                        file.digest
                    ),
                    Ok(ReceiveOutcome::Stopped) => tracing::info!("{}: transfer stopped", peer),
                    Ok(ReceiveOutcome::Disconnected) => {
                        tracing::info!("{}: disconnected without a file", peer);
                    }
                    Err(e) => tracing::warn!("{}: session failed: {}", peer, e),
                }
            });
        }
    }
}

/// Retry `accept` until it yields a connection, pausing `ACCEPT_BACKOFF`
/// after each failure so a persistent error (e.g. out of file descriptors)
/// does not spin.
async fn accept_with_backoff<A, F, T, E>(mut accept: A) -> T
where
    A: FnMut() -> F,
    F: Future<Output = std::result::Result<T, E>>,
    E: fmt::Display,
{
    loop {
        match accept().await {
            Ok(conn) => return conn,
            Err(e) => {
                tracing::warn!("Accept failed: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

/// Run one receive session over `conn`.
///
/// # Errors
///
/// Returns the session's error, if any.
pub async fn receive_on<C: Connection>(
    conn: C,
    private_key: Arc<PrivateKey>,
    config: &ServerConfig,
) -> Result<ReceiveOutcome> {
    let channel = MessageChannel::new(conn).with_recv_timeout(config.idle_timeout);
    let mut session = ReceiverSession::new(channel, private_key, config.receiver.clone());
    let result = session.run().await;

    let stats = session.transport_stats();
    tracing::debug!(
        "Session traffic: {} frames / {} bytes in, {} frames / {} bytes out",
        stats.frames_received,
        stats.bytes_received,
        stats.frames_sent,
        stats.bytes_sent
    );
    result
}
