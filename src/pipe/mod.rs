//! # Pipes
//!
//! A [`Pipe`] is one end of a bidirectional message channel. All transports share the same
//! buffering, batching, flushing and lifecycle logic; what differs between them is a small
//! [`Transport`] capability that moves wire text and releases resources.

use super::*;

mod direct;
mod envelope;
mod local;
#[allow(clippy::module_inception)]
mod pipe;
mod pipe_error;
mod transport;
mod webrtc;
mod websocket;
mod worker;

pub use direct::{direct_pair, DirectTransport};
pub use envelope::{encode_batch, new_call, prepare_answer, unmarshal, Envelope, Payload, WireMessage, BATCH_KEY};
pub use local::connect_local;
pub use pipe::{Pipe, PipeSettings, WeakPipe, DEFAULT_MAX_ACCUMULATED_MESSAGES};
pub use pipe_error::PipeError;
pub use transport::{PipeSubtype, Transport, TransportKind};
pub use webrtc::{WebRtcClientPipe, WebRtcServerPipe};
pub use websocket::{WebSocketClientPipe, WebSocketTransport, WsOutbound};
pub(crate) use websocket::{drain_outbound, request_close, OUTBOUND_BUFFER_SIZE};
pub use worker::{
    out_of_worker_on_message, InWorkerServerTransport, OutOfWorkerClientPipe,
    WorkerClientRegistry, WorkerMessage, WorkerMessageType, WorkerPort,
};
