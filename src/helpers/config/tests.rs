use super::*;

fn args(list: &[&str]) -> Vec<String> {
    std::iter::once("cool-socket")
        .chain(list.iter().cloned())
        .map(str::to_string)
        .collect()
}

fn build(fs: &MockFilesystem, list: &[&str]) -> Result<MasterConfig, Box<dyn Error>> {
    build_config_with(fs.boxed(), args(list))
}

#[test]
fn defaults_match_component_settings() {
    let conf = build(&MockFilesystem::new(), &[]).unwrap();
    assert!(!conf.happy_exit);
    assert_eq!(conf.net, NetConfig::default());
    assert_eq!(conf.pipe.max_accumulated_messages, 30);
    assert_eq!(conf.pipe.ws_reconnect_after, Duration::from_millis(100));
    assert_eq!(conf.webrtc_acceptor, WebRtcAcceptorSettings::default());
    assert_eq!(conf.discovery, DiscoverySettings::default());
    assert_eq!(conf.rtc.peer_configuration, PeerConfiguration::default());
    assert_eq!(conf.rtc.data_channel_label, "genericDataChannel");
    assert_eq!(conf.rtc.default_signaling_url, "ws://localhost:17172");
    assert_eq!(conf.space_defaults(), SpaceDefaults::default());
}

#[test]
fn toml_file_overrides_defaults() {
    let fs = MockFilesystem::new().add_file(
        "cool-socket.toml",
        "hostname = \"example.org\"\nsignaling_port = 9000\necho_server = true\n",
    );
    let conf = build(&fs, &[]).unwrap();
    assert_eq!(conf.net.hostname, "example.org");
    assert_eq!(conf.net.signaling_port, 9000);
    assert!(conf.net.echo_server);
    assert_eq!(conf.rtc.default_signaling_url, "ws://example.org:9000");
}

#[test]
fn arguments_override_toml_file() {
    let fs = MockFilesystem::new().add_file("cool-socket.toml", "ws_port = 9001");
    let conf = build(&fs, &["--ws-port=9002", "--max_active_offers", "3"]).unwrap();
    assert_eq!(conf.net.ws_port, 9002);
    assert_eq!(conf.webrtc_acceptor.max_active_offers, 3);
}

#[test]
fn bare_flag_sets_bool() {
    let conf = build(&MockFilesystem::new(), &["--echo-server", "--fast_publish_joiner=false"]).unwrap();
    assert!(conf.net.echo_server);
    assert!(!conf.rtc.fast_publish_joiner);
}

#[test]
fn millisecond_entries_become_durations() {
    let conf = build(
        &MockFilesystem::new(),
        &[
            "--time_to_publish_ms=250",
            "--time_to_signaling_negotiation_ms=5000",
            "--offer_discovery_period_ms=50",
            "--offer_discovery_steps=4",
            "--ws_reconnect_after_ms=0",
        ],
    )
    .unwrap();
    assert_eq!(conf.webrtc_acceptor.time_to_publish, Duration::from_millis(250));
    assert_eq!(
        conf.webrtc_acceptor.time_to_signaling_negotiation,
        Duration::from_secs(5)
    );
    assert_eq!(conf.discovery.period, Duration::from_millis(50));
    assert_eq!(conf.discovery.step_count, 4);
    assert_eq!(conf.pipe.ws_reconnect_after, Duration::ZERO);
}

#[test]
fn zero_active_offers_means_one() {
    let conf = build(&MockFilesystem::new(), &["--max_active_offers=0"]).unwrap();
    assert_eq!(conf.webrtc_acceptor.max_active_offers, 1);
}

#[test]
fn ice_servers_are_split_on_commas() {
    let conf = build(
        &MockFilesystem::new(),
        &["--ice_servers=stun:a.example:3478, ,stun:b.example"],
    )
    .unwrap();
    assert_eq!(
        conf.rtc.peer_configuration,
        PeerConfiguration {
            ice_servers: vec![
                IceServer::new("stun:a.example:3478"),
                IceServer::new("stun:b.example"),
            ],
        }
    );
}

#[test]
fn secure_needs_existing_key_and_cert() {
    let fs = MockFilesystem::new().add_file("key.pem", "KEY");
    let err = build(&fs, &["--secure"]).unwrap_err().to_string();
    assert!(err.contains("tls_key_path"));
    let err = build(&fs, &["--secure", "--tls_key_path=key.pem", "--tls_cert_path=cert.pem"])
        .unwrap_err()
        .to_string();
    assert!(err.contains("cert.pem"));

    let fs = fs.add_file("cert.pem", "CERT");
    let conf = build(&fs, &["--secure", "--tls_key_path=key.pem", "--tls_cert_path=cert.pem"])
        .unwrap();
    assert_eq!(
        conf.net.tls,
        Some(TlsMaterial {
            key_path: "key.pem".to_string(),
            cert_path: "cert.pem".to_string(),
        })
    );
    assert_eq!(conf.rtc.default_signaling_url, "wss://localhost:17172");
}

#[test]
fn key_paths_are_ignored_when_not_secure() {
    let conf = build(&MockFilesystem::new(), &["--tls_key_path=key.pem"]).unwrap();
    assert_eq!(conf.net.tls, None);
}

#[test]
fn help_lists_entries_and_exits_happily() {
    let conf = build(&MockFilesystem::new(), &["--ws_port=1", "--help"]).unwrap();
    assert!(conf.happy_exit);
    let help = conf.help.unwrap();
    assert!(help.contains("--signaling_port (int, default 17172)"));
    assert!(help.contains("--data_channel_label (string, default \"genericDataChannel\")"));
    assert!(help.contains("--secure (bool, default false)"));
}

#[test]
fn unknown_option_is_an_error() {
    let err = build(&MockFilesystem::new(), &["--warp-speed=9"])
        .unwrap_err()
        .to_string();
    assert!(err.contains("--warp-speed"));
    let fs = MockFilesystem::new().add_file("cool-socket.toml", "warp_speed = 9");
    assert!(build(&fs, &[]).is_err());
}

#[test]
fn wrong_types_are_errors() {
    assert!(build(&MockFilesystem::new(), &["--ws_port=lots"]).is_err());
    assert!(build(&MockFilesystem::new(), &["--ws_port"]).is_err());
    assert!(build(&MockFilesystem::new(), &["--secure=maybe"]).is_err());
    let fs = MockFilesystem::new().add_file("cool-socket.toml", "secure = \"yes\"");
    assert!(build(&fs, &[]).is_err());
}

#[test]
fn out_of_range_values_are_errors() {
    assert!(build(&MockFilesystem::new(), &["--signaling_port=70000"]).is_err());
    assert!(build(&MockFilesystem::new(), &["--time_to_publish_ms=-5"]).is_err());
    assert!(build(&MockFilesystem::new(), &["--offer_discovery_period_ms=0"]).is_err());
}

#[test]
fn values_before_any_option_are_errors() {
    assert!(build(&MockFilesystem::new(), &["stray"]).is_err());
    assert!(build(&MockFilesystem::new(), &["--ws_port", "1", "2"]).is_err());
}

#[test]
fn malformed_toml_names_the_file() {
    let fs = MockFilesystem::new().add_file("cool-socket.toml", "ws_port = = 3");
    let err = build(&fs, &[]).unwrap_err().to_string();
    assert!(err.contains("cool-socket.toml"));
}
