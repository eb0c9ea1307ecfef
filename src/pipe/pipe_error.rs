use super::*;

#[derive(Debug, Clone, PartialEq)]
pub enum PipeError {
    /// The other end of a loopback pair is gone or no longer connected
    CounterpartDisconnected,
    /// Nothing is listening on the local endpoint
    NoSuchServer(String),
    /// Something is already listening on the endpoint or port
    AlreadyListening(String),
    /// A WebSocket acceptor is already listening on the port
    PortInUse(u16),
    BadUrl(String),
    /// The outbound queue of a network transport is full, string names the transport
    ChannelFull(String),
    /// The outbound queue of a network transport is gone, string names the transport
    ChannelClosed(String),
    /// The pipe has already released its transport, string describes the pipe
    NoTransport(String),
}

impl std::fmt::Display for PipeError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::CounterpartDisconnected => {
                write!(f, "Cannot send messages to disconnected local server pipe")
            }
            Self::NoSuchServer(endpoint) => write!(
                f,
                "Cannot connect to local socket server \"{}\" endpoint, no such server",
                endpoint
            ),
            Self::AlreadyListening(endpoint) => write!(
                f,
                "Cannot start local socket server on already listening \"{}\" endpoint",
                endpoint
            ),
            Self::PortInUse(port) => write!(
                f,
                "Cannot start web socket server on already listening port {}",
                port
            ),
            Self::BadUrl(url) => write!(f, "bad url {:?}", url),
            Self::ChannelFull(what) => {
                write!(f, "{} outbound channel is full (can't send message)", what)
            }
            Self::ChannelClosed(what) => {
                write!(f, "{} outbound channel closed (can't send message)", what)
            }
            Self::NoTransport(pipe) => write!(f, "{} has no transport to send through", pipe),
        }
    }
}

impl Error for PipeError {}
