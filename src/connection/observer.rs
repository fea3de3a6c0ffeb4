//! Observer seam: state, identity, toast and data callbacks
//!
//! Transition notices (state changes, device identity, toasts) are queued
//! on a channel in the order their transitions occur and delivered by a
//! single dispatcher task, so the observer sees them in strict transition
//! order. Data-received callbacks carry a live borrow of the session input
//! stream and are delivered directly from the session read loop; they may
//! interleave with transition notices.

use crate::transport::Peer;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, RwLock, RwLockReadGuard};
use tokio::task::JoinHandle;

/// Toast shown when an outbound connection attempt fails
pub const TOAST_CONNECT_FAILED: &str = "Unable to connect device";
/// Toast shown when an established connection drops
pub const TOAST_CONNECTION_LOST: &str = "Device connection was lost";

/// Lifecycle state of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Doing nothing
    Idle,
    /// Listening for inbound connections
    Listening,
    /// Initiating an outbound connection
    Connecting,
    /// Connected to a remote device
    Connected,
}

/// Callbacks delivered to the registered observer.
///
/// `on_data_received` hands over the raw command byte plus the live input
/// stream; the observer is responsible for knowing how many further bytes
/// belong to that command. Inbound traffic carries no length prefix.
#[async_trait]
pub trait LinkObserver: Send + Sync + 'static {
    async fn on_state_changed(&self, state: LinkState);

    async fn on_device_identified(&self, peer: &Peer);

    /// Transient user-visible message
    async fn on_toast(&self, message: &str);

    async fn on_data_received(&self, cmd: u8, stream: &mut (dyn AsyncRead + Send + Unpin));
}

/// The zero-or-one registered observer.
///
/// Deliveries hold the read side of the lock for their duration, so
/// `detach` (which takes the write side) blocks until any in-flight
/// callback to the old observer has completed. That is the handoff
/// barrier: once `detach` returns, the stale observer receives nothing.
#[derive(Clone, Default)]
pub struct ObserverSlot {
    inner: Arc<RwLock<Option<Arc<dyn LinkObserver>>>>,
}

impl ObserverSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer, replacing any existing one
    pub async fn attach(&self, observer: Arc<dyn LinkObserver>) {
        *self.inner.write().await = Some(observer);
    }

    /// Remove the observer, blocking until in-flight deliveries complete
    pub async fn detach(&self) {
        *self.inner.write().await = None;
    }

    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, Option<Arc<dyn LinkObserver>>> {
        self.inner.read().await
    }
}

/// One queued transition notice
#[derive(Debug)]
pub(crate) enum Notice {
    State(LinkState),
    Identified(Peer),
    Toast(&'static str),
}

/// Sequential delivery path for transition notices
#[derive(Clone)]
pub(crate) struct Notifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl Notifier {
    /// Spawn the dispatcher task feeding the given observer slot
    pub(crate) fn spawn(slot: ObserverSlot) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Notice>();
        let task = tokio::spawn(async move {
            while let Some(notice) = rx.recv().await {
                let guard = slot.read().await;
                if let Some(observer) = guard.as_ref() {
                    match &notice {
                        Notice::State(state) => observer.on_state_changed(*state).await,
                        Notice::Identified(peer) => observer.on_device_identified(peer).await,
                        Notice::Toast(message) => observer.on_toast(message).await,
                    }
                }
            }
        });
        (Self { tx }, task)
    }

    pub(crate) fn state_changed(&self, state: LinkState) {
        let _ = self.tx.send(Notice::State(state));
    }

    pub(crate) fn device_identified(&self, peer: Peer) {
        let _ = self.tx.send(Notice::Identified(peer));
    }

    pub(crate) fn toast(&self, message: &'static str) {
        let _ = self.tx.send(Notice::Toast(message));
    }
}
