//! # Signaling server
//!
//! Creators and joiners meet here to swap offers and answers. The namespace is a tree:
//! [`SignalingManager`] → [`SignalingCategory`] → [`SignalingSpace`] → [`SignalingClient`].
//! Inner nodes are created on first use and go away as soon as they are empty. The
//! [`SignalingServer`] binds each accepted pipe to a client through "signalingImpersonate" and
//! answers the other signaling methods on its behalf.

use super::*;

mod category;
mod client;
mod error;
mod manager;
mod server;
mod settings;
mod space;
#[cfg(test)]
mod tests;

pub use category::SignalingCategory;
pub use client::SignalingClient;
pub use error::SignalingError;
pub use manager::SignalingManager;
pub use server::SignalingServer;
pub use settings::{
    DiscoverySettings, OfferRecord, SignalingAuthInfo, SpaceDefaults,
    DEFAULT_OFFER_DISCOVERY_PERIOD, DEFAULT_OFFER_DISCOVERY_STEPS,
};
pub use space::SignalingSpace;

use category::WeakSignalingCategory;
use manager::WeakSignalingManager;
use space::WeakSignalingSpace;
