//! Session I/O for one established connection
//!
//! The read loop owns the input half for the session's whole lifetime and
//! performs one-byte blocking reads, handing each command byte plus the
//! live stream to the observer. Write primitives operate on the output
//! half through a cloneable handle; all writes are fire-and-forget, errors
//! are logged and never surfaced to the caller.

use crate::codec::{Frame, CHUNK_SIZE};
use crate::connection::observer::ObserverSlot;
use crate::transport::{ConnReader, ConnWriter, Peer, SecurityMode};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Handle for writing to the active session. Writes taken from different
/// clones are serialized by the internal lock, but callers that need a
/// particular byte ordering must serialize externally.
#[derive(Clone)]
pub struct SessionHandle {
    writer: Arc<Mutex<ConnWriter>>,
    mode: SecurityMode,
    peer: Peer,
}

impl SessionHandle {
    pub fn new(writer: ConnWriter, mode: SecurityMode, peer: Peer) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
            mode,
            peer,
        }
    }

    /// Security mode the session was established with
    pub fn mode(&self) -> SecurityMode {
        self.mode
    }

    /// Identity of the connected device
    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Write a single command byte and flush
    pub async fn write_byte(&self, cmd: u8) {
        if let Err(e) = self.try_write_byte(cmd).await {
            warn!("Exception during write command: {}", e);
        }
    }

    /// Encode and write a framed message as one buffer
    pub async fn send(&self, frame: &Frame) {
        let encoded = match frame.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode frame: {}", e);
                return;
            }
        };
        if let Err(e) = self.try_write_all(&encoded).await {
            warn!("Exception sending frame: {}", e);
        }
    }

    /// Copy an arbitrary readable source to the session in fixed-size
    /// chunks until exhausted, flushing once at the end
    pub async fn write_stream<R>(&self, source: &mut R)
    where
        R: AsyncRead + Send + Unpin + ?Sized,
    {
        if let Err(e) = self.try_write_stream(source).await {
            warn!("Exception during write stream: {}", e);
        }
    }

    /// Write the first `len` bytes of a buffer in fixed-size chunks,
    /// flushing once at the end. `len` is clamped to the buffer size.
    pub async fn write_buffer(&self, buffer: &[u8], len: usize) {
        if let Err(e) = self.try_write_buffer(buffer, len).await {
            warn!("Exception during write: {}", e);
        }
    }

    async fn try_write_byte(&self, cmd: u8) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(&[cmd]).await?;
        writer.flush().await
    }

    async fn try_write_all(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await
    }

    async fn try_write_stream<R>(&self, source: &mut R) -> io::Result<()>
    where
        R: AsyncRead + Send + Unpin + ?Sized,
    {
        let mut writer = self.writer.lock().await;
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            let n = source.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&chunk[..n]).await?;
        }
        writer.flush().await
    }

    async fn try_write_buffer(&self, buffer: &[u8], len: usize) -> io::Result<()> {
        let len = len.min(buffer.len());
        let mut writer = self.writer.lock().await;
        for chunk in buffer[..len].chunks(CHUNK_SIZE) {
            writer.write_all(chunk).await?;
        }
        writer.flush().await
    }
}

/// Run the session read loop until the stream errors or closes.
///
/// Each successfully read byte is delivered together with the remaining
/// input stream; the observer decides how many further bytes to consume
/// for that command. A missing observer consumes and drops the byte.
pub(crate) async fn run_read_loop(mut reader: ConnReader, observers: ObserverSlot) {
    let mut byte = [0u8; 1];
    loop {
        match reader.read_exact(&mut byte).await {
            Ok(_) => {
                let guard = observers.read().await;
                if let Some(observer) = guard.as_ref() {
                    observer.on_data_received(byte[0], &mut *reader).await;
                }
            }
            Err(e) => {
                debug!("Session read ended: {}", e);
                return;
            }
        }
    }
}
