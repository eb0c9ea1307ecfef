//! # Acceptors
//!
//! An [`Acceptor`] listens on some transport and hands out server-side pipes through its
//! "connection" event. It owns the pipes it produced until they disconnect.

use super::*;

#[allow(clippy::module_inception)]
mod acceptor;
mod in_worker_acceptor;
mod local_acceptor;
mod registry;
mod webrtc_acceptor;
mod websocket_acceptor;

pub use acceptor::{Acceptor, AcceptorEntry, AcceptorKind, WeakAcceptor};
pub use in_worker_acceptor::{in_worker_on_message, InWorkerAcceptor};
pub use local_acceptor::{LocalAcceptor, DEFAULT_LOCAL_ENDPOINT};
pub use registry::EndpointRegistry;
pub use webrtc_acceptor::{WebRtcAcceptor, WebRtcAcceptorSettings};
pub use websocket_acceptor::{TlsMaterial, WebSocketAcceptor};
