//! Connection manager: owns the link lifecycle state machine
//!
//! One worker task per blocking role: up to two listen workers (secure and
//! insecure), at most one dial worker, at most one session read loop. All
//! shared state lives behind a single lock and every transition runs as a
//! non-blocking critical section. Workers never mutate state themselves;
//! they report accept/dial/read outcomes back through the shared core,
//! which is the sole mutator.

use crate::codec::Frame;
use crate::connection::observer::{
    LinkObserver, LinkState, Notifier, ObserverSlot, TOAST_CONNECTION_LOST, TOAST_CONNECT_FAILED,
};
use crate::connection::session::{self, SessionHandle};
use crate::transport::{Connection, Peer, SecurityMode, Transport};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Errors from [`ConnectionManager::connect_to_known_address`]
#[derive(Error, Debug)]
pub enum KnownAddressError {
    #[error("Device {0} is not in the bonded device set")]
    NotBonded(String),

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

type WorkerId = u64;

/// A spawned listen or dial worker
struct Worker {
    id: WorkerId,
    task: JoinHandle<()>,
}

/// The live session for one established connection
struct Session {
    id: WorkerId,
    handle: SessionHandle,
    task: JoinHandle<()>,
}

/// State guarded by the single manager lock
struct Inner {
    state: LinkState,
    listeners: Vec<Worker>,
    dial: Option<Worker>,
    session: Option<Session>,
}

impl Inner {
    /// Cancel all listen workers. The worker requesting the transition, if
    /// any, keeps running; it observes the outcome and ends on its own.
    fn cancel_listeners(&mut self, reporter: Option<WorkerId>) {
        for worker in self.listeners.drain(..) {
            if Some(worker.id) != reporter {
                worker.task.abort();
            }
        }
    }

    fn cancel_dial(&mut self, reporter: Option<WorkerId>) {
        if let Some(worker) = self.dial.take() {
            if Some(worker.id) != reporter {
                worker.task.abort();
            }
        }
    }

    fn cancel_session(&mut self, reporter: Option<WorkerId>) {
        if let Some(session) = self.session.take() {
            if Some(session.id) != reporter {
                session.task.abort();
            }
        }
    }
}

struct Shared {
    transport: Arc<dyn Transport>,
    observers: ObserverSlot,
    notifier: Notifier,
    inner: Mutex<Inner>,
    next_worker_id: AtomicU64,
}

impl Shared {
    fn next_id(&self) -> WorkerId {
        self.next_worker_id.fetch_add(1, Ordering::SeqCst)
    }

    fn set_state(&self, inner: &mut Inner, state: LinkState) {
        if inner.state != state {
            debug!("setState() {:?} -> {:?}", inner.state, state);
            inner.state = state;
            self.notifier.state_changed(state);
        }
    }

    /// Enter listening mode: tear down dial and session, make sure both
    /// listen workers are running. No-op for workers already running.
    fn start_listening(this: &Arc<Self>, inner: &mut Inner, reporter: Option<WorkerId>) {
        inner.cancel_dial(reporter);
        inner.cancel_session(reporter);

        if inner.listeners.is_empty() {
            for mode in [SecurityMode::Secure, SecurityMode::Insecure] {
                let worker = Self::spawn_listen_worker(this, mode);
                inner.listeners.push(worker);
            }
        }

        this.set_state(inner, LinkState::Listening);
    }

    fn spawn_listen_worker(this: &Arc<Self>, mode: SecurityMode) -> Worker {
        let id = this.next_id();
        let shared = this.clone();
        let task = tokio::spawn(async move {
            let mut listener = match shared.transport.listen(mode).await {
                Ok(listener) => listener,
                Err(e) => {
                    // No retry: the listener for this mode stays absent
                    warn!("{} listen() failed: {}", mode, e);
                    return;
                }
            };

            loop {
                match listener.accept().await {
                    Ok(conn) => {
                        if Shared::established(&shared, id, mode, conn).await {
                            return;
                        }
                        // Stray connection was closed; keep accepting
                    }
                    Err(e) => {
                        warn!("{} accept() failed: {}", mode, e);
                        return;
                    }
                }
            }
        });
        Worker { id, task }
    }

    /// Resolve a successful accept or dial into the active session.
    /// Returns false if no owner claims the connection, in which case it
    /// is dropped (closed) here.
    async fn established(
        this: &Arc<Self>,
        reporter: WorkerId,
        mode: SecurityMode,
        conn: Box<dyn Connection>,
    ) -> bool {
        let mut inner = this.inner.lock().await;
        if !matches!(inner.state, LinkState::Listening | LinkState::Connecting) {
            debug!("Closing stray {} connection in state {:?}", mode, inner.state);
            return false;
        }

        inner.cancel_listeners(Some(reporter));
        inner.cancel_dial(Some(reporter));

        let peer = conn.peer();
        debug!("connected, socket type {}: {}", mode, peer.address);

        let (reader, writer) = conn.into_split();
        let handle = SessionHandle::new(writer, mode, peer.clone());

        let id = this.next_id();
        let shared = this.clone();
        let observers = this.observers.clone();
        let task = tokio::spawn(async move {
            session::run_read_loop(reader, observers).await;
            Shared::read_failed(&shared, id).await;
        });
        inner.session = Some(Session { id, handle, task });

        this.set_state(&mut inner, LinkState::Connected);
        this.notifier.device_identified(peer);
        true
    }

    async fn dial_failed(this: &Arc<Self>, reporter: WorkerId) {
        let mut inner = this.inner.lock().await;
        if inner.dial.as_ref().map(|w| w.id) != Some(reporter) {
            return;
        }
        inner.dial = None;

        this.notifier.toast(TOAST_CONNECT_FAILED);
        Self::start_listening(this, &mut inner, Some(reporter));
    }

    async fn read_failed(this: &Arc<Self>, reporter: WorkerId) {
        let mut inner = this.inner.lock().await;
        if inner.session.as_ref().map(|s| s.id) != Some(reporter) {
            return;
        }
        inner.session = None;

        this.notifier.toast(TOAST_CONNECTION_LOST);
        Self::start_listening(this, &mut inner, Some(reporter));
    }

    /// Handle for the active session, if Connected
    async fn current_session(&self) -> Option<SessionHandle> {
        let inner = self.inner.lock().await;
        if inner.state != LinkState::Connected {
            return None;
        }
        inner.session.as_ref().map(|s| s.handle.clone())
    }
}

/// Sets up and manages connections over one stream transport: a pair of
/// listen workers for inbound sessions, a dial worker for outbound
/// attempts, and a session worker for the established connection.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    dispatcher: JoinHandle<()>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let observers = ObserverSlot::new();
        let (notifier, dispatcher) = Notifier::spawn(observers.clone());

        let shared = Arc::new(Shared {
            transport,
            observers,
            notifier,
            inner: Mutex::new(Inner {
                state: LinkState::Idle,
                listeners: Vec::new(),
                dial: None,
                session: None,
            }),
            next_worker_id: AtomicU64::new(1),
        });

        Self { shared, dispatcher }
    }

    /// Register the observer, replacing any existing one
    pub async fn attach_observer(&self, observer: Arc<dyn LinkObserver>) {
        self.shared.observers.attach(observer).await;
    }

    /// Remove the observer. Blocks until any in-flight delivery to it has
    /// completed; afterwards it receives no further notifications.
    pub async fn detach_observer(&self) {
        self.shared.observers.detach().await;
    }

    /// Current lifecycle state
    pub async fn state(&self) -> LinkState {
        self.shared.inner.lock().await.state
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == LinkState::Connected
    }

    /// Identity of the connected device, if any
    pub async fn connected_peer(&self) -> Option<Peer> {
        let inner = self.shared.inner.lock().await;
        inner.session.as_ref().map(|s| s.handle.peer().clone())
    }

    /// Enter listening mode: cancel any dial or session and start the
    /// secure and insecure listen workers
    pub async fn start(&self) {
        debug!("link start");
        let mut inner = self.shared.inner.lock().await;
        Shared::start_listening(&self.shared, &mut inner, None);
    }

    /// Initiate an outbound connection attempt to a remote device
    pub async fn connect(&self, address: &str, mode: SecurityMode) {
        debug!("connect to: {} ({})", address, mode);
        let mut inner = self.shared.inner.lock().await;
        inner.cancel_dial(None);
        inner.cancel_session(None);
        inner.cancel_listeners(None);

        let id = self.shared.next_id();
        let shared = self.shared.clone();
        let address = address.to_string();
        let task = tokio::spawn(async move {
            match shared.transport.dial(&address, mode).await {
                Ok(conn) => {
                    if !Shared::established(&shared, id, mode, conn).await {
                        debug!("Dialed connection to {} no longer wanted", address);
                    }
                }
                Err(e) => {
                    warn!("Failed to connect to {}: {}", address, e);
                    Shared::dial_failed(&shared, id).await;
                }
            }
        });
        inner.dial = Some(Worker { id, task });

        self.shared.set_state(&mut inner, LinkState::Connecting);
    }

    /// Connect to a device from the transport's bonded set. An address
    /// outside the bonded set is rejected without side effects.
    pub async fn connect_to_known_address(
        &self,
        address: &str,
        mode: SecurityMode,
    ) -> Result<(), KnownAddressError> {
        let bonded = self.shared.transport.bonded_devices().await?;
        if !bonded.iter().any(|a| a == address) {
            return Err(KnownAddressError::NotBonded(address.to_string()));
        }
        self.connect(address, mode).await;
        Ok(())
    }

    /// Cancel all workers and return to idle
    pub async fn stop(&self) {
        debug!("link stop");
        let mut inner = self.shared.inner.lock().await;
        inner.cancel_listeners(None);
        inner.cancel_dial(None);
        inner.cancel_session(None);
        self.shared.set_state(&mut inner, LinkState::Idle);
    }

    /// Send a framed message. Dropped when not connected.
    pub async fn send(&self, frame: &Frame) {
        match self.shared.current_session().await {
            Some(handle) => handle.send(frame).await,
            None => trace!("Dropped frame: not connected"),
        }
    }

    /// Write a single command byte. Dropped when not connected.
    pub async fn write_byte(&self, cmd: u8) {
        match self.shared.current_session().await {
            Some(handle) => handle.write_byte(cmd).await,
            None => trace!("Dropped write: not connected"),
        }
    }

    /// Copy a readable source to the session. Dropped when not connected.
    pub async fn write_stream<R>(&self, source: &mut R)
    where
        R: AsyncRead + Send + Unpin + ?Sized,
    {
        match self.shared.current_session().await {
            Some(handle) => handle.write_stream(source).await,
            None => trace!("Dropped stream write: not connected"),
        }
    }

    /// Write the first `len` bytes of a buffer. Dropped when not connected.
    pub async fn write_buffer(&self, buffer: &[u8], len: usize) {
        match self.shared.current_session().await {
            Some(handle) => handle.write_buffer(buffer, len).await,
            None => trace!("Dropped buffer write: not connected"),
        }
    }

    /// Write a whole buffer. Dropped when not connected.
    pub async fn write_all_buffer(&self, buffer: &[u8]) {
        self.write_buffer(buffer, buffer.len()).await;
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.dispatcher.abort();
        // Best effort: skipped if a worker holds the lock mid-transition.
        if let Ok(mut inner) = self.shared.inner.try_lock() {
            inner.cancel_listeners(None);
            inner.cancel_dial(None);
            inner.cancel_session(None);
        }
    }
}
