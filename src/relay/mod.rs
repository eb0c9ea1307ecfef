//! # Relays
//!
//! A relay splices two pipes together: whatever arrives on one is sent out the other, and a
//! close or error on either side tears both down. Relay events ("message", "close", "error")
//! carry "relayName", "remoteAddress" of the incoming side and "isExternalSocket", which is
//! true when the incoming side is the one that fired.

use super::*;

mod one_to_one_relay;
mod out_of_worker_relay;
mod relay_link;

pub use one_to_one_relay::OneToOneRelay;
pub use out_of_worker_relay::{CreateRelayClient, OutOfWorkerRelay};

use relay_link::{link_pipes, AutoFlush, RelayCore};
