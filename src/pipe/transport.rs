use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Null,
    Direct,
    Local,
    InWorker,
    WebSocket,
    WebRtc,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Null => "NULL",
                Self::Direct => "Direct",
                Self::Local => "Local",
                Self::InWorker => "InWorker",
                Self::WebSocket => "WS",
                Self::WebRtc => "WebRTC",
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeSubtype {
    Server,
    Client,
    /// Either end of a direct pair, or the null pipe
    Loopback,
}

impl std::fmt::Display for PipeSubtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Server => "server",
                Self::Client => "client",
                Self::Loopback => "loopback",
            }
        )
    }
}

/// The part of a pipe that differs between transports
pub trait Transport {
    /// Hands one wire message to the underlying channel. Errors are reported to the caller of
    /// Pipe::send() and dispatched as an "error" event by the pipe.
    fn transmit(&self, pipe: &Pipe, text: String) -> Result<(), Box<dyn Error>>;
    /// Releases the channel. Called once, after the pipe has been marked disconnected.
    fn teardown(&self, pipe: &Pipe);
}

/// Swallows everything
pub(super) struct NullTransport;

impl Transport for NullTransport {
    fn transmit(&self, _: &Pipe, _: String) -> Result<(), Box<dyn Error>> {
        Ok(())
    }

    fn teardown(&self, _: &Pipe) {}
}
