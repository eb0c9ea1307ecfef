//! # WebRTC negotiation
//!
//! Two roles meet through a signaling server. An [`RtcCreator`] publishes offers, one
//! [`ServerPeer`] per offer, and an [`RtcJoiner`] fetches one offer and answers it. Once the
//! answer reaches the creator both sides share a data channel.
//!
//! The WebRTC stack itself sits behind the [`PeerFactory`], [`PeerConnection`] and
//! [`DataChannel`] traits. [`LoopbackNetwork`] implements them in-process.
//!
//! Every participant dispatches progress events (see each type) with itself attached.

use super::*;

mod context;
mod creator;
mod joiner;
mod loopback;
mod peer_link;
mod provider;
mod server_peer;
mod signaling_link;

pub use context::{
    local_signaling, websocket_signaling, ActorConfig, Role, RtcContext, RtcSettings,
    SignalingConnector, DEFAULT_CATEGORY, DEFAULT_DATA_CHANNEL_LABEL, DEFAULT_SIGNALING_URL,
    DEFAULT_SPACE,
};
pub use creator::RtcCreator;
pub use joiner::RtcJoiner;
pub use loopback::{LoopbackFault, LoopbackNetwork};
pub use provider::{
    ChannelEvent, ChannelEventSink, DataChannel, DescriptionCallback, DoneCallback,
    IceCandidate, IceConnectionState, IceServer, OfferOptions, PeerConfiguration,
    PeerConnection, PeerEvent, PeerEventSink, PeerFactory, SdpKind, SessionDescription,
    SignalingState, DEFAULT_ICE_SERVERS,
};
pub use server_peer::{ServerPeer, ServerPeerState};

use creator::WeakRtcCreator;
use peer_link::{
    close_data_channel, close_peer, fail, peer_sink, send_text, watch_channel, Participant,
    PeerLink,
};
use signaling_link::{answer_error, close_signaling, open_signaling, Actor, ActorCore};
