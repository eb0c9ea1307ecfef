//! # cool-socket
//!
//! One message pipe abstraction over several transports (direct loopback, local endpoints,
//! worker boundaries, WebSockets and WebRTC data channels), acceptors that hand out server-side
//! pipes, relays that splice two pipes together, a small RPC layer, and the signaling server
//! plus offer/answer state machines used to negotiate WebRTC data channels.
//!
//! Everything here runs on a single-threaded [`EventLoop`]. Network I/O happens on tokio tasks
//! and is handed back to the loop through a [`RemoteSender`].

#[macro_use(new_key_type)]
extern crate slotmap;
#[macro_use]
extern crate log;

use std::{
    any::Any,
    cell::{Cell, RefCell},
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    error::Error,
    fmt::{Debug, Formatter},
    rc::{Rc, Weak},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

mod acceptor;
mod event_loop;
mod events;
mod helpers;
mod pipe;
mod relay;
mod rpc;
mod rtc;
mod signaling;

pub use acceptor::{
    in_worker_on_message, Acceptor, AcceptorEntry, AcceptorKind, EndpointRegistry,
    InWorkerAcceptor, LocalAcceptor, TlsMaterial, WebRtcAcceptor, WebRtcAcceptorSettings,
    WebSocketAcceptor, DEFAULT_LOCAL_ENDPOINT,
};
pub use event_loop::{EventLoop, RemoteSender, StopHandle, TimerKey};
pub use events::{listener, Event, EventDispatcher, EventSource, Listener};
pub use helpers::{
    build_config, build_config_with, random_call_id, random_uuid, real_filesystem, ConfigEntry,
    Filesystem, FilesystemTrait, MasterConfig, NetConfig, OrLog,
};
pub use pipe::{
    connect_local, direct_pair, new_call, out_of_worker_on_message, prepare_answer, Envelope,
    OutOfWorkerClientPipe, Payload, Pipe, PipeError, PipeSettings, PipeSubtype, Transport,
    TransportKind, WeakPipe, WebRtcClientPipe, WebRtcServerPipe, WebSocketClientPipe,
    WireMessage, WorkerClientRegistry, WorkerMessage, WorkerMessageType, WorkerPort,
    DEFAULT_MAX_ACCUMULATED_MESSAGES,
};
pub use relay::{CreateRelayClient, OneToOneRelay, OutOfWorkerRelay};
pub use rpc::{echo_handler, RpcHandler, RpcServer};
pub use rtc::{
    local_signaling, websocket_signaling, ActorConfig, DataChannel, IceCandidate,
    IceConnectionState, IceServer, LoopbackFault, LoopbackNetwork, OfferOptions,
    PeerConfiguration, PeerConnection, PeerFactory, Role, RtcContext, RtcCreator, RtcJoiner,
    RtcSettings, SdpKind, ServerPeer, ServerPeerState, SessionDescription, SignalingConnector,
    SignalingState, DEFAULT_CATEGORY, DEFAULT_DATA_CHANNEL_LABEL, DEFAULT_ICE_SERVERS,
    DEFAULT_SIGNALING_URL, DEFAULT_SPACE,
};
pub use signaling::{
    DiscoverySettings, OfferRecord, SignalingAuthInfo, SignalingCategory, SignalingClient,
    SignalingError, SignalingManager, SignalingServer, SignalingSpace, SpaceDefaults,
};

use acceptor::*;
use event_loop::*;
use events::*;
use helpers::*;
use pipe::*;
use relay::*;
use rpc::*;
use rtc::*;
use signaling::*;
