//! RFCOMM transport implementation over BlueZ

use crate::transport::traits::{
    ConnReader, ConnWriter, Connection, Listener, Peer, SecurityMode, Transport,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bluer::rfcomm::{Listener as RfcommListener, SocketAddr as RfcommAddr, Stream as RfcommStream};
use bluer::{Adapter, Address};
use tracing::debug;

/// Default RFCOMM channel for secure sessions
pub const DEFAULT_SECURE_CHANNEL: u8 = 1;
/// Default RFCOMM channel for insecure sessions
pub const DEFAULT_INSECURE_CHANNEL: u8 = 2;

/// Configuration for the RFCOMM transport
#[derive(Debug, Clone)]
pub struct RfcommConfig {
    /// Channel used for secure listen/dial
    pub secure_channel: u8,
    /// Channel used for insecure listen/dial
    pub insecure_channel: u8,
}

impl Default for RfcommConfig {
    fn default() -> Self {
        Self {
            secure_channel: DEFAULT_SECURE_CHANNEL,
            insecure_channel: DEFAULT_INSECURE_CHANNEL,
        }
    }
}

impl RfcommConfig {
    fn channel(&self, mode: SecurityMode) -> u8 {
        match mode {
            SecurityMode::Secure => self.secure_channel,
            SecurityMode::Insecure => self.insecure_channel,
        }
    }
}

/// An established RFCOMM connection
pub struct RfcommConnection {
    stream: RfcommStream,
    peer: Peer,
}

impl Connection for RfcommConnection {
    fn peer(&self) -> Peer {
        self.peer.clone()
    }

    fn into_split(self: Box<Self>) -> (ConnReader, ConnWriter) {
        let (reader, writer) = tokio::io::split(self.stream);
        (Box::new(reader), Box::new(writer))
    }
}

/// A bound RFCOMM listening endpoint
pub struct RfcommLinkListener {
    listener: RfcommListener,
    adapter: Adapter,
}

#[async_trait]
impl Listener for RfcommLinkListener {
    async fn accept(&mut self) -> Result<Box<dyn Connection>> {
        let (stream, addr) = self.listener.accept().await?;
        let peer = resolve_peer(&self.adapter, addr.addr).await;
        Ok(Box::new(RfcommConnection { stream, peer }))
    }
}

/// RFCOMM transport backed by the default BlueZ adapter. Secure and
/// insecure sessions are served on distinct channels.
pub struct RfcommLink {
    adapter: Adapter,
    config: RfcommConfig,
}

impl RfcommLink {
    /// Open the default adapter and power it on
    pub async fn new(config: RfcommConfig) -> Result<Self> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;
        Ok(Self { adapter, config })
    }
}

#[async_trait]
impl Transport for RfcommLink {
    async fn listen(&self, mode: SecurityMode) -> Result<Box<dyn Listener>> {
        let channel = self.config.channel(mode);
        let local = RfcommAddr::new(Address::any(), channel);
        let listener = RfcommListener::bind(local)
            .await
            .map_err(|e| anyhow!("RFCOMM bind on channel {} failed: {}", channel, e))?;
        debug!("[BT] Listening ({}) on channel {}", mode, channel);
        Ok(Box::new(RfcommLinkListener {
            listener,
            adapter: self.adapter.clone(),
        }))
    }

    async fn dial(&self, address: &str, mode: SecurityMode) -> Result<Box<dyn Connection>> {
        let addr: Address = address
            .parse()
            .map_err(|_| anyhow!("Invalid Bluetooth address: {}", address))?;
        let channel = self.config.channel(mode);

        debug!("[BT] Connecting to {} channel {}", addr, channel);
        let stream = RfcommStream::connect(RfcommAddr::new(addr, channel))
            .await
            .map_err(|e| anyhow!("RFCOMM connect failed: {}", e))?;

        let peer = resolve_peer(&self.adapter, addr).await;
        Ok(Box::new(RfcommConnection { stream, peer }))
    }

    async fn bonded_devices(&self) -> Result<Vec<String>> {
        let mut bonded = Vec::new();
        for addr in self.adapter.device_addresses().await? {
            let device = self.adapter.device(addr)?;
            if device.is_paired().await.unwrap_or(false) {
                bonded.push(addr.to_string());
            }
        }
        Ok(bonded)
    }
}

/// Look up the friendly name for a peer address, best-effort
async fn resolve_peer(adapter: &Adapter, addr: Address) -> Peer {
    let name = match adapter.device(addr) {
        Ok(device) => device.name().await.ok().flatten(),
        Err(_) => None,
    };
    Peer {
        address: addr.to_string(),
        name,
    }
}
