//! Transport trait abstraction for pluggable link backends

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Socket security mode requested from the transport. The core passes this
/// through opaquely; what "secure" means is the transport's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityMode {
    Secure,
    Insecure,
}

impl std::fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityMode::Secure => write!(f, "Secure"),
            SecurityMode::Insecure => write!(f, "Insecure"),
        }
    }
}

/// Identity of the remote end of an established connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Transport-level address (e.g. a Bluetooth BDADDR)
    pub address: String,
    /// Friendly device name, when the transport knows one
    pub name: Option<String>,
}

/// Read half of an established connection
pub type ConnReader = Box<dyn AsyncRead + Send + Unpin>;
/// Write half of an established connection
pub type ConnWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An established bidirectional stream connection. Dropping both halves
/// closes the underlying socket; closing twice is harmless.
pub trait Connection: Send + 'static {
    /// Identity of the remote device
    fn peer(&self) -> Peer;

    /// Consume the connection, yielding its stream halves
    fn into_split(self: Box<Self>) -> (ConnReader, ConnWriter);
}

/// A bound listening endpoint. The pending `accept` is cancelled by
/// dropping the listener, which closes the endpoint.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Block until an inbound connection arrives
    async fn accept(&mut self) -> Result<Box<dyn Connection>>;
}

/// Factory for listening endpoints and outbound connections
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a listening endpoint for the given security mode
    async fn listen(&self, mode: SecurityMode) -> Result<Box<dyn Listener>>;

    /// Perform a single blocking outbound connection attempt. Cancelled by
    /// dropping the in-flight future, which closes the dialing socket.
    async fn dial(&self, address: &str, mode: SecurityMode) -> Result<Box<dyn Connection>>;

    /// Addresses of devices already bonded/paired at the platform level
    async fn bonded_devices(&self) -> Result<Vec<String>>;
}
