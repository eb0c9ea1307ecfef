use super::*;
use tokio::runtime::Handle;

pub const DEFAULT_CATEGORY: &str = "default category";
pub const DEFAULT_SPACE: &str = "default space";
pub const DEFAULT_SIGNALING_URL: &str = "ws://localhost:17172";
pub const DEFAULT_DATA_CHANNEL_LABEL: &str = "genericDataChannel";

/// Opens the pipe an actor talks to the signaling server through
pub type SignalingConnector = Rc<dyn Fn(&str) -> Result<Pipe, Box<dyn Error>>>;

/// Signaling URLs name local endpoints
pub fn local_signaling(registry: &EndpointRegistry) -> SignalingConnector {
    let registry = registry.clone();
    Rc::new(move |url: &str| connect_local(&registry, Some(url)))
}

pub fn websocket_signaling(
    event_loop: &EventLoop,
    runtime: &Handle,
    settings: &PipeSettings,
) -> SignalingConnector {
    let event_loop = event_loop.clone();
    let runtime = runtime.clone();
    let settings = settings.clone();
    Rc::new(move |url: &str| WebSocketClientPipe::connect(url, &event_loop, &runtime, &settings))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Creator,
    Joiner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creator => "creator",
            Self::Joiner => "joiner",
        }
    }

    pub fn parse(role: &str) -> Option<Self> {
        match role {
            "creator" => Some(Self::Creator),
            "joiner" => Some(Self::Joiner),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RtcSettings {
    pub data_channel_label: String,
    /// Server peers publish their offer on the first ICE candidate instead of waiting for
    /// gathering to finish
    pub fast_publish_server_peer: bool,
    /// Same for the joiner's answer
    pub fast_publish_joiner: bool,
    /// WebRTC client pipes drop their signaling pipe once the data channel is open
    pub auto_close_signaling_pipe: bool,
    pub peer_configuration: PeerConfiguration,
    pub default_signaling_url: String,
    pub default_category: String,
    pub default_space: String,
}

impl Default for RtcSettings {
    fn default() -> Self {
        Self {
            data_channel_label: DEFAULT_DATA_CHANNEL_LABEL.to_string(),
            fast_publish_server_peer: true,
            fast_publish_joiner: true,
            auto_close_signaling_pipe: true,
            peer_configuration: PeerConfiguration::default(),
            default_signaling_url: DEFAULT_SIGNALING_URL.to_string(),
            default_category: DEFAULT_CATEGORY.to_string(),
            default_space: DEFAULT_SPACE.to_string(),
        }
    }
}

/// Who an actor is and where it signals. Blank fields fall back to the RtcSettings defaults
/// (and a random participant id).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActorConfig {
    pub signaling_url: String,
    pub id_rtc_participant: Option<String>,
    pub offer_options: OfferOptions,
    pub id_category: String,
    pub id_space: String,
}

impl ActorConfig {
    pub fn new(signaling_url: &str) -> Self {
        Self {
            signaling_url: signaling_url.to_string(),
            ..Self::default()
        }
    }

    pub fn with_participant(mut self, id: &str) -> Self {
        self.id_rtc_participant = Some(id.to_string());
        self
    }

    pub fn in_space(mut self, id_category: &str, id_space: &str) -> Self {
        self.id_category = id_category.to_string();
        self.id_space = id_space.to_string();
        self
    }

    pub(crate) fn resolve(&self, settings: &RtcSettings) -> Self {
        let or_default = |value: &str, default: &str| {
            if value.is_empty() {
                default.to_string()
            } else {
                value.to_string()
            }
        };
        Self {
            signaling_url: or_default(&self.signaling_url, &settings.default_signaling_url),
            id_rtc_participant: self.id_rtc_participant.clone(),
            offer_options: self.offer_options.clone(),
            id_category: or_default(&self.id_category, &settings.default_category),
            id_space: or_default(&self.id_space, &settings.default_space),
        }
    }
}

/// What every RTC participant needs from the outside world
#[derive(Clone, derivative::Derivative)]
#[derivative(Debug)]
pub struct RtcContext {
    #[derivative(Debug = "ignore")]
    pub event_loop: EventLoop,
    #[derivative(Debug = "ignore")]
    pub peers: Rc<dyn PeerFactory>,
    #[derivative(Debug = "ignore")]
    pub connect_signaling: SignalingConnector,
    pub settings: RtcSettings,
}

impl RtcContext {
    pub fn new(
        event_loop: &EventLoop,
        peers: Rc<dyn PeerFactory>,
        connect_signaling: SignalingConnector,
    ) -> Self {
        Self {
            event_loop: event_loop.clone(),
            peers,
            connect_signaling,
            settings: RtcSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RtcSettings) -> Self {
        self.settings = settings;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_parse_their_wire_names() {
        assert_eq!(Role::parse("creator"), Some(Role::Creator));
        assert_eq!(Role::parse(Role::Joiner.as_str()), Some(Role::Joiner));
        assert_eq!(Role::parse("Creator"), None);
        assert_eq!(serde_json::to_value(Role::Joiner).unwrap(), json!("joiner"));
    }

    #[test]
    fn blank_actor_fields_take_defaults() {
        let config = ActorConfig::new("").resolve(&RtcSettings::default());
        assert_eq!(config.signaling_url, DEFAULT_SIGNALING_URL);
        assert_eq!(config.id_category, DEFAULT_CATEGORY);
        assert_eq!(config.id_space, DEFAULT_SPACE);
        assert_eq!(config.id_rtc_participant, None);
    }

    #[test]
    fn given_actor_fields_are_kept() {
        let config = ActorConfig::new("sig")
            .with_participant("p")
            .in_space("c", "s")
            .resolve(&RtcSettings::default());
        assert_eq!(config.signaling_url, "sig");
        assert_eq!(config.id_rtc_participant.as_deref(), Some("p"));
        assert_eq!((config.id_category.as_str(), config.id_space.as_str()), ("c", "s"));
    }

    #[test]
    fn local_connector_fails_for_unknown_endpoint() {
        let registry = EndpointRegistry::new();
        let connect = local_signaling(&registry);
        let error = connect("nowhere").err().unwrap().to_string();
        assert!(error.contains("no such server"), "{}", error);
    }
}
