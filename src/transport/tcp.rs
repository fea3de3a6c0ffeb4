//! TCP simulation transport for development without a Bluetooth stack
//!
//! Maps the secure/insecure listen endpoints to two configured TCP ports
//! and dials peers by `host:port` string. The bonded-device set is a
//! configured list, standing in for the platform's pairing registry.

use crate::transport::traits::{
    ConnReader, ConnWriter, Connection, Listener, Peer, SecurityMode, Transport,
};
use anyhow::Result;
use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

/// Configuration for the TCP simulation transport
#[derive(Debug, Clone)]
pub struct TcpLinkConfig {
    /// Listen address for secure-mode sessions
    pub secure_addr: String,
    /// Listen address for insecure-mode sessions
    pub insecure_addr: String,
    /// Simulated bonded-device set (peer addresses)
    pub bonded: Vec<String>,
}

impl Default for TcpLinkConfig {
    fn default() -> Self {
        Self {
            secure_addr: "127.0.0.1:9001".into(),
            insecure_addr: "127.0.0.1:9002".into(),
            bonded: Vec::new(),
        }
    }
}

/// An established TCP connection
pub struct TcpConnection {
    stream: TcpStream,
    peer: Peer,
}

impl TcpConnection {
    pub fn new(stream: TcpStream) -> Self {
        let address = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".into());
        Self {
            stream,
            peer: Peer {
                address,
                name: None,
            },
        }
    }
}

impl Connection for TcpConnection {
    fn peer(&self) -> Peer {
        self.peer.clone()
    }

    fn into_split(self: Box<Self>) -> (ConnReader, ConnWriter) {
        let (reader, writer) = self.stream.into_split();
        (Box::new(reader), Box::new(writer))
    }
}

pub struct TcpLinkListener {
    listener: TcpListener,
}

#[async_trait]
impl Listener for TcpLinkListener {
    async fn accept(&mut self) -> Result<Box<dyn Connection>> {
        let (stream, _) = self.listener.accept().await?;
        Ok(Box::new(TcpConnection::new(stream)))
    }
}

/// TCP transport implementing the link capability set
pub struct TcpLink {
    config: TcpLinkConfig,
}

impl TcpLink {
    pub fn new(config: TcpLinkConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Transport for TcpLink {
    async fn listen(&self, mode: SecurityMode) -> Result<Box<dyn Listener>> {
        let addr = match mode {
            SecurityMode::Secure => &self.config.secure_addr,
            SecurityMode::Insecure => &self.config.insecure_addr,
        };
        let listener = TcpListener::bind(addr).await?;
        debug!("[TCP] Listening ({}) on {}", mode, addr);
        Ok(Box::new(TcpLinkListener { listener }))
    }

    async fn dial(&self, address: &str, _mode: SecurityMode) -> Result<Box<dyn Connection>> {
        let stream = TcpStream::connect(address).await?;
        Ok(Box::new(TcpConnection::new(stream)))
    }

    async fn bonded_devices(&self) -> Result<Vec<String>> {
        Ok(self.config.bonded.clone())
    }
}
