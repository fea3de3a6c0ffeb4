//! btlink: connection lifecycle management for RFCOMM-style transports
//!
//! This crate does all the work for setting up and managing stream
//! connections with remote devices. The [`ConnectionManager`] runs a task
//! that listens for incoming connections (secure and insecure), a task for
//! connecting out to a device, and a task performing reads while
//! connected, recovering back into listening mode whenever a connection
//! attempt fails or an established connection drops.
//!
//! Transports plug in through the [`transport::Transport`] trait; a BlueZ
//! RFCOMM backend and a TCP simulation backend are provided. A single
//! [`LinkObserver`] receives state changes, device identity, transient
//! toast messages, and inbound data.

pub mod codec;
pub mod connection;
pub mod transport;

pub use codec::{Frame, CHUNK_SIZE, MAX_PAYLOAD};
pub use connection::{
    ConnectionManager, KnownAddressError, LinkObserver, LinkState, SessionHandle,
    TOAST_CONNECTION_LOST, TOAST_CONNECT_FAILED,
};
pub use transport::{Peer, SecurityMode, Transport};
