//! Shared helpers for sealdrop integration tests.

use async_trait::async_trait;
use rand::RngCore;
use sealdrop_core::{Message, ReceiverConfig};
use sealdrop_crypto::{KeyPair, PrivateKey};
use sealdrop_transport::{Connection, TransportResult, TransportStats};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Write `len` random bytes to `dir/name` and return the path and contents.
pub fn random_file(dir: &Path, name: &str, len: usize) -> (PathBuf, Vec<u8>) {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    let path = dir.join(name);
    std::fs::write(&path, &data).unwrap();
    (path, data)
}

/// Receiver configuration writing into `dir`.
pub fn receiver_config(dir: &Path) -> ReceiverConfig {
    ReceiverConfig {
        output_dir: dir.to_path_buf(),
        ..ReceiverConfig::default()
    }
}

/// Private half of `keys`, shareable across sessions.
pub fn shared_private(keys: &KeyPair) -> Arc<PrivateKey> {
    Arc::new(PrivateKey::from_bytes(keys.private.to_bytes()))
}

type Rewrite = Box<dyn FnMut(Message) -> Message + Send>;

/// Connection wrapper that rewrites outgoing messages.
///
/// Frames that do not decode are passed through untouched.
pub struct TamperingConnection<C> {
    inner: C,
    rewrite: Rewrite,
}

impl<C: Connection> TamperingConnection<C> {
    /// Wrap `inner`, passing every outgoing message through `rewrite`.
    pub fn new<F>(inner: C, rewrite: F) -> Self
    where
        F: FnMut(Message) -> Message + Send + 'static,
    {
        Self {
            inner,
            rewrite: Box::new(rewrite),
        }
    }
}

#[async_trait]
impl<C: Connection> Connection for TamperingConnection<C> {
    async fn send_frame(&mut self, frame: &[u8]) -> TransportResult<()> {
        let frame = match Message::decode(frame) {
            Ok(msg) => (self.rewrite)(msg).encode().unwrap(),
            Err(_) => frame.to_vec(),
        };
        self.inner.send_frame(&frame).await
    }

    async fn recv_frame(&mut self) -> TransportResult<Vec<u8>> {
        self.inner.recv_frame().await
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.inner.close().await
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.peer_addr()
    }

    fn stats(&self) -> TransportStats {
        self.inner.stats()
    }
}

/// Rewrite the chunk with sequence `target` using `f`; leave everything else alone.
pub fn on_chunk<F>(target: u32, mut f: F) -> impl FnMut(Message) -> Message + Send + 'static
where
    F: FnMut(u32, Vec<u8>, u16) -> Message + Send + 'static,
{
    move |msg| match msg {
        Message::Chunk {
            sequence,
            ciphertext,
            checksum,
        } if sequence == target => f(sequence, ciphertext, checksum),
        other => other,
    }
}
