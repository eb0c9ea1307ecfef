use super::*;
use std::convert::TryFrom;

fn port(value: u64) -> Result<u16, Box<dyn Error>> {
    u16::try_from(value).map_err(|_| format!("{} is not a valid port", value).into())
}

fn millis(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// These entries will be applied in order of returned vec (NOT in the order the user specifies the entry). All entries
/// Will always be applied.
pub fn config_entries() -> Vec<Box<dyn ConfigEntry>> {
    // We concat! long strings so the vec can be formatted by rustfmt (see https://github.com/rust-lang/rustfmt/issues/3863)
    vec![
        <dyn ConfigEntry>::new_string(
            "hostname",
            "host used to build the default signaling URL",
            "localhost",
            |conf, hostname, source| {
                if hostname.trim().is_empty() {
                    return Err(format!("{} should not be empty", source.unwrap_or("hostname")).into());
                }
                conf.net.hostname = hostname;
                Ok(())
            },
        ),
        <dyn ConfigEntry>::new_bool(
            "secure",
            "serve wss:// with the TLS key and certificate below",
            false,
            |conf, secure, _| {
                conf.net.tls = if secure {
                    Some(TlsMaterial {
                        key_path: String::new(),
                        cert_path: String::new(),
                    })
                } else {
                    None
                };
                Ok(())
            },
        ),
        <dyn ConfigEntry>::new_string(
            "tls_key_path",
            "PEM private key, used when secure",
            "",
            |conf, path, _| {
                if let Some(tls) = &mut conf.net.tls {
                    tls.key_path = path;
                }
                Ok(())
            },
        ),
        <dyn ConfigEntry>::new_string(
            "tls_cert_path",
            "PEM certificate, used when secure",
            "",
            |conf, path, _| {
                if let Some(tls) = &mut conf.net.tls {
                    tls.cert_path = path;
                }
                Ok(())
            },
        ),
        <dyn ConfigEntry>::new_unsigned(
            "signaling_port",
            "port of the hosted signaling server",
            17172,
            |conf, value| {
                conf.net.signaling_port = port(value)?;
                Ok(())
            },
        ),
        <dyn ConfigEntry>::new_unsigned(
            "ws_port",
            "port of the echo RPC server",
            17171,
            |conf, value| {
                conf.net.ws_port = port(value)?;
                Ok(())
            },
        ),
        <dyn ConfigEntry>::new_bool(
            "signaling_server",
            "host the signaling server",
            true,
            |conf, enable, _| {
                conf.net.signaling_server = enable;
                Ok(())
            },
        ),
        <dyn ConfigEntry>::new_bool(
            "echo_server",
            "host an RPC server that echoes every call back, on ws_port",
            false,
            |conf, enable, _| {
                conf.net.echo_server = enable;
                Ok(())
            },
        ),
        <dyn ConfigEntry>::new_unsigned(
            "max_accumulated_messages",
            concat!(
                "messages a pipe buffers before sending them as one batch, ",
                "0 or 1 sends every message at once"
            ),
            DEFAULT_MAX_ACCUMULATED_MESSAGES as u64,
            |conf, value| {
                conf.pipe.max_accumulated_messages = value as usize;
                Ok(())
            },
        ),
        <dyn ConfigEntry>::new_unsigned(
            "ws_reconnect_after_ms",
            "delay before a WebSocket client retries a failed connection, 0 to never retry",
            100,
            |conf, value| {
                conf.pipe.ws_reconnect_after = millis(value);
                Ok(())
            },
        ),
        <dyn ConfigEntry>::new_unsigned(
            "max_active_offers",
            "offers a WebRTC acceptor keeps published at once (at least 1)",
            10,
            |conf, value| {
                conf.webrtc_acceptor.max_active_offers = (value as usize).max(1);
                Ok(())
            },
        ),
        <dyn ConfigEntry>::new_unsigned(
            "time_to_publish_ms",
            "how long a server peer may take to publish its offer, 0 for no limit",
            0,
            |conf, value| {
                conf.webrtc_acceptor.time_to_publish = millis(value);
                Ok(())
            },
        ),
        <dyn ConfigEntry>::new_unsigned(
            "time_to_signaling_negotiation_ms",
            concat!(
                "how long a published offer may wait for an answer before it is replaced, ",
                "0 for no limit"
            ),
            0,
            |conf, value| {
                conf.webrtc_acceptor.time_to_signaling_negotiation = millis(value);
                Ok(())
            },
        ),
        <dyn ConfigEntry>::new_unsigned(
            "offer_discovery_period_ms",
            "how often the signaling server looks for an offer for a waiting joiner",
            DEFAULT_OFFER_DISCOVERY_PERIOD.as_millis() as u64,
            |conf, value| {
                if value == 0 {
                    return Err("offer discovery period should not be zero".into());
                }
                conf.discovery.period = millis(value);
                Ok(())
            },
        ),
        <dyn ConfigEntry>::new_unsigned(
            "offer_discovery_steps",
            "how many times the signaling server looks before answering \"no offer found\"",
            DEFAULT_OFFER_DISCOVERY_STEPS as u64,
            |conf, value| {
                conf.discovery.step_count = u32::try_from(value.max(1))?;
                Ok(())
            },
        ),
        <dyn ConfigEntry>::new_bool(
            "fast_publish_server_peer",
            "server peers publish their offer on the first ICE candidate",
            true,
            |conf, enable, _| {
                conf.rtc.fast_publish_server_peer = enable;
                Ok(())
            },
        ),
        <dyn ConfigEntry>::new_bool(
            "fast_publish_joiner",
            "joiners publish their answer on the first ICE candidate",
            true,
            |conf, enable, _| {
                conf.rtc.fast_publish_joiner = enable;
                Ok(())
            },
        ),
        <dyn ConfigEntry>::new_bool(
            "auto_close_signaling_pipe",
            "joiners close their signaling pipe once the data channel is open",
            true,
            |conf, enable, _| {
                conf.rtc.auto_close_signaling_pipe = enable;
                Ok(())
            },
        ),
        <dyn ConfigEntry>::new_string(
            "data_channel_label",
            "label of the data channel server peers create",
            DEFAULT_DATA_CHANNEL_LABEL,
            |conf, label, _| {
                conf.rtc.data_channel_label = label;
                Ok(())
            },
        ),
        <dyn ConfigEntry>::new_string(
            "ice_servers",
            "comma separated ICE server URLs",
            &DEFAULT_ICE_SERVERS.join(","),
            |conf, urls, _| {
                conf.rtc.peer_configuration = PeerConfiguration::from_urls(urls.split(','));
                Ok(())
            },
        ),
        <dyn ConfigEntry>::new_string(
            "default_category",
            "signaling category used when a participant names none",
            DEFAULT_CATEGORY,
            |conf, id, source| {
                if id.is_empty() {
                    return Err(format!("{} should not be empty", source.unwrap_or("default")).into());
                }
                conf.rtc.default_category = id;
                Ok(())
            },
        ),
        <dyn ConfigEntry>::new_string(
            "default_space",
            "signaling space used when a participant names none",
            DEFAULT_SPACE,
            |conf, id, source| {
                if id.is_empty() {
                    return Err(format!("{} should not be empty", source.unwrap_or("default")).into());
                }
                conf.rtc.default_space = id;
                Ok(())
            },
        ),
    ]
}
