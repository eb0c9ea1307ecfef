use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Serializes the way browsers do, {"type": "offer", "sdp": "..."}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn new(kind: SdpKind, sdp: &str) -> Self {
        Self {
            kind,
            sdp: sdp.to_string(),
        }
    }

    pub fn to_value(&self) -> Value {
        json!({"type": self.kind, "sdp": self.sdp})
    }

    pub fn from_value(value: &Value) -> Result<Self, Box<dyn Error>> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

impl std::fmt::Display for SignalingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Stable => "stable",
                Self::HaveLocalOffer => "have-local-offer",
                Self::HaveRemoteOffer => "have-remote-offer",
                Self::HaveLocalPranswer => "have-local-pranswer",
                Self::HaveRemotePranswer => "have-remote-pranswer",
                Self::Closed => "closed",
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
}

impl IceConnectionState {
    /// States after which the connection is not coming back
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Disconnected | Self::Closed)
    }
}

impl std::fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::New => "new",
                Self::Checking => "checking",
                Self::Connected => "connected",
                Self::Completed => "completed",
                Self::Failed => "failed",
                Self::Disconnected => "disconnected",
                Self::Closed => "closed",
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn new(url: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: None,
            credential: None,
        }
    }
}

/// Public STUN servers used when nothing else is configured
pub const DEFAULT_ICE_SERVERS: &[&str] = &[
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
    "stun:stun2.l.google.com:19302",
    "stun:stun3.l.google.com:19302",
    "stun:stun4.l.google.com:19302",
    "stun:stun.ekiga.net",
    "stun:stun.ideasip.com",
    "stun:stun.schlund.de",
    "stun:stun.voiparound.com",
    "stun:stun.voipbuster.com",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerConfiguration {
    pub ice_servers: Vec<IceServer>,
}

impl PeerConfiguration {
    /// One ICE server per URL, skipping blanks
    pub fn from_urls<'a, I: IntoIterator<Item = &'a str>>(urls: I) -> Self {
        Self {
            ice_servers: urls
                .into_iter()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(IceServer::new)
                .collect(),
        }
    }
}

impl Default for PeerConfiguration {
    fn default() -> Self {
        Self::from_urls(DEFAULT_ICE_SERVERS.iter().cloned())
    }
}

/// Only data channels are negotiated, so these all default to false
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferOptions {
    pub offer_to_receive_audio: bool,
    pub offer_to_receive_video: bool,
    pub voice_activity_detection: bool,
    pub ice_restart: bool,
}

/// What a peer connection reports on its own
pub enum PeerEvent {
    /// None once gathering is complete
    IceCandidate(Option<IceCandidate>),
    IceConnectionState(IceConnectionState),
    /// The other side opened a data channel
    DataChannel(Rc<dyn DataChannel>),
}

pub enum ChannelEvent {
    Open,
    Message(String),
    Close,
    Error(String),
}

pub type PeerEventSink = Rc<dyn Fn(PeerEvent)>;
pub type ChannelEventSink = Rc<dyn Fn(ChannelEvent)>;
pub type DescriptionCallback = Box<dyn FnOnce(Result<SessionDescription, Box<dyn Error>>)>;
pub type DoneCallback = Box<dyn FnOnce(Result<(), Box<dyn Error>>)>;

/// A WebRTC peer connection. Completion callbacks and sink events must be delivered
/// asynchronously (never from inside the call that caused them), the same as browser promises.
pub trait PeerConnection {
    fn set_event_sink(&self, sink: Option<PeerEventSink>);
    fn create_offer(&self, options: &OfferOptions, done: DescriptionCallback);
    fn create_answer(&self, options: &OfferOptions, done: DescriptionCallback);
    fn set_local_description(&self, description: SessionDescription, done: DoneCallback);
    fn set_remote_description(&self, description: SessionDescription, done: DoneCallback);
    fn local_description(&self) -> Option<SessionDescription>;
    fn signaling_state(&self) -> SignalingState;
    fn ice_connection_state(&self) -> IceConnectionState;
    fn create_data_channel(&self, label: &str) -> Result<Rc<dyn DataChannel>, Box<dyn Error>>;
    fn close(&self);
}

pub trait DataChannel {
    fn label(&self) -> String;
    fn set_event_sink(&self, sink: Option<ChannelEventSink>);
    fn is_open(&self) -> bool;
    fn send(&self, text: &str) -> Result<(), Box<dyn Error>>;
    fn close(&self);
}

pub trait PeerFactory {
    fn create_peer(
        &self,
        configuration: &PeerConfiguration,
    ) -> Result<Rc<dyn PeerConnection>, Box<dyn Error>>;
}
