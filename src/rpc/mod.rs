//! # Request/response over pipes
//!
//! An [`RpcServer`] answers every envelope arriving on the pipes its acceptor hands out, by
//! looking up a handler for the envelope's "method".

use super::*;

mod rpc_server;

pub use rpc_server::{echo_handler, RpcHandler, RpcServer};
