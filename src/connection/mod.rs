pub mod manager;
pub mod observer;
pub mod session;

pub use manager::{ConnectionManager, KnownAddressError};
pub use observer::{
    LinkObserver, LinkState, ObserverSlot, TOAST_CONNECTION_LOST, TOAST_CONNECT_FAILED,
};
pub use session::SessionHandle;
