use super::*;

/// Where the binary listens
#[derive(Debug, Clone, PartialEq)]
pub struct NetConfig {
    pub hostname: String,
    pub signaling_port: u16,
    pub ws_port: u16,
    pub signaling_server: bool,
    pub echo_server: bool,
    /// Some when WebSocket acceptors serve wss://
    pub tls: Option<TlsMaterial>,
}

impl NetConfig {
    /// The URL clients of the hosted signaling server connect to
    pub fn signaling_url(&self) -> String {
        let scheme = if self.tls.is_some() { "wss" } else { "ws" };
        format!("{}://{}:{}", scheme, self.hostname, self.signaling_port)
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            signaling_port: 17172,
            ws_port: 17171,
            signaling_server: true,
            echo_server: false,
            tls: None,
        }
    }
}

/// Configuration for the whole cool-socket program
#[derive(Debug)]
pub struct MasterConfig {
    /// If to abort with success (for example, after showing --help)
    pub happy_exit: bool,
    /// What --help asked to show
    pub help: Option<String>,
    pub net: NetConfig,
    pub pipe: PipeSettings,
    pub rtc: RtcSettings,
    pub webrtc_acceptor: WebRtcAcceptorSettings,
    pub discovery: DiscoverySettings,
}

impl MasterConfig {
    pub fn space_defaults(&self) -> SpaceDefaults {
        SpaceDefaults {
            category: self.rtc.default_category.clone(),
            space: self.rtc.default_space.clone(),
        }
    }
}

impl Default for MasterConfig {
    /// NOTE: the true default configuration is determined by config_entries(), this just holds
    /// each component's own defaults
    fn default() -> Self {
        Self {
            happy_exit: false,
            help: None,
            net: NetConfig::default(),
            pipe: PipeSettings::default(),
            rtc: RtcSettings::default(),
            webrtc_acceptor: WebRtcAcceptorSettings::default(),
            discovery: DiscoverySettings::default(),
        }
    }
}
