pub mod rfcomm;
pub mod tcp;
pub mod traits;

pub use rfcomm::{RfcommConfig, RfcommLink, DEFAULT_INSECURE_CHANNEL, DEFAULT_SECURE_CHANNEL};
pub use tcp::{TcpLink, TcpLinkConfig};
pub use traits::{ConnReader, ConnWriter, Connection, Listener, Peer, SecurityMode, Transport};
