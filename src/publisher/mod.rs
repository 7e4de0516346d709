//! Snapshot audit publisher
//!
//! Sends each normalized snapshot to an observer over a Unix socket as a
//! length-prefixed MessagePack frame. Publishing never fails the ingest path.

use bytes::{BufMut, Bytes, BytesMut};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::book::NormalizedSnapshot;
use crate::error::{IngestError, Result};

/// Encode a snapshot as `[u32 big-endian length][msgpack body]`
pub fn encode_frame(snapshot: &NormalizedSnapshot) -> Result<Bytes> {
    let body = rmp_serde::to_vec_named(snapshot)?;
    let len = u32::try_from(body.len())
        .map_err(|_| IngestError::Serialization(format!("frame too large: {} bytes", body.len())))?;

    let mut frame = BytesMut::with_capacity(4 + body.len());
    frame.put_u32(len);
    frame.put_slice(&body);
    Ok(frame.freeze())
}

/// Publisher for snapshot audits via Unix socket
pub struct Publisher {
    socket_path: String,
    stream: Mutex<Option<UnixStream>>,
}

impl Publisher {
    /// Create a publisher; the observer may come up later
    pub async fn new(socket_path: &str) -> Self {
        let publisher = Self {
            socket_path: socket_path.to_string(),
            stream: Mutex::new(None),
        };

        if let Err(e) = publisher.connect().await {
            warn!(error = %e, "Initial audit connection failed, will retry on publish");
        }

        publisher
    }

    async fn connect(&self) -> Result<()> {
        let path = Path::new(&self.socket_path);

        if !path.exists() {
            return Err(IngestError::Ipc(format!(
                "Socket path does not exist: {}",
                self.socket_path
            )));
        }

        let stream = UnixStream::connect(path).await.map_err(|e| {
            IngestError::Ipc(format!("Failed to connect to {}: {}", self.socket_path, e))
        })?;

        *self.stream.lock().await = Some(stream);

        info!(path = %self.socket_path, "Connected to audit socket");
        Ok(())
    }

    /// Publish a snapshot.
    ///
    /// Returns whether the frame was written. Connection problems are logged
    /// and the connection is retried on the next call.
    pub async fn publish(&self, snapshot: &NormalizedSnapshot) -> Result<bool> {
        let frame = encode_frame(snapshot)?;

        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            drop(guard);
            if let Err(e) = self.connect().await {
                debug!(error = %e, "Audit socket unavailable");
                return Ok(false);
            }
            guard = self.stream.lock().await;
        }

        let Some(stream) = guard.as_mut() else {
            return Ok(false);
        };

        match stream.write_all(&frame).await {
            Ok(()) => {
                debug!(
                    instrument = %snapshot.instrument,
                    bids = snapshot.bids.len(),
                    asks = snapshot.asks.len(),
                    bytes = frame.len(),
                    "Published snapshot audit"
                );
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "Failed to write to audit socket");
                *guard = None;
                Ok(false)
            }
        }
    }
}
