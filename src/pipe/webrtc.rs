use super::*;

type ListenerSet = RefCell<Vec<(&'static str, Listener)>>;

fn detach<S: EventSource>(source: &S, listeners: &ListenerSet) {
    for (kind, listener) in listeners.borrow_mut().drain(..) {
        source.off(kind, Some(&listener));
    }
}

/// Server pipes send through the data channel of an identified ServerPeer
struct ServerPeerTransport {
    peer: ServerPeer,
    event_loop: EventLoop,
    listeners: ListenerSet,
}

impl Transport for ServerPeerTransport {
    fn transmit(&self, _: &Pipe, text: String) -> Result<(), Box<dyn Error>> {
        self.peer.send(&text)
    }

    fn teardown(&self, pipe: &Pipe) {
        detach(&self.peer, &self.listeners);
        trace!("{} releasing {}", pipe.describe(), self.peer.describe());
        // The peer may be in the middle of reporting an error to others
        let peer = self.peer.clone();
        self.event_loop.defer(move || peer.dispose());
    }
}

pub struct WebRtcServerPipe;

impl WebRtcServerPipe {
    /// Wraps a peer whose joiner has been identified. The pipe connects, registers with the
    /// acceptor and is announced through "connection" once the data channel opens.
    pub fn new(acceptor: &Acceptor, peer: &ServerPeer, signaling_url: &str) -> Pipe {
        let client_number = acceptor.next_client_number();
        let transport = Rc::new(ServerPeerTransport {
            peer: peer.clone(),
            event_loop: acceptor.event_loop().clone(),
            listeners: RefCell::new(Vec::new()),
        });
        let pipe = Pipe::new(
            TransportKind::WebRtc,
            PipeSubtype::Server,
            &format!("rtc_server_pipe({})://{}", client_number, signaling_url),
            acceptor.settings(),
            transport.clone(),
        );
        pipe.set_remote_address(&peer.other_side().unwrap_or_default());
        let key = client_number.to_string();
        let weak_acceptor = acceptor.downgrade();
        // These hold the pipe until teardown detaches them
        let on_open = {
            let pipe = pipe.clone();
            listener(move |_| {
                if !pipe.mark_connected() {
                    return;
                }
                if let Some(acceptor) = weak_acceptor.upgrade() {
                    acceptor.register_client(&key, AcceptorEntry::Single(pipe.clone()));
                    pipe.emit_open();
                    acceptor.emit(
                        Event::new("connection")
                            .with("remoteAddress", pipe.remote_address())
                            .attach(pipe.clone()),
                    );
                } else {
                    pipe.emit_open();
                }
            })
        };
        let on_message = {
            let pipe = pipe.clone();
            listener(move |event| {
                if let Some(data) = event.str_field("data") {
                    pipe.receive(data);
                }
            })
        };
        let on_error = {
            let pipe = pipe.clone();
            listener(move |event| {
                let error = event.str_field("error").unwrap_or("WebRTC peer error");
                pipe.emit_error(error);
                pipe.disconnect();
            })
        };
        let on_close = {
            let pipe = pipe.downgrade();
            let event_loop = acceptor.event_loop().clone();
            listener(move |_| {
                // Let an error that caused the close reach listeners first
                let pipe = pipe.clone();
                event_loop.defer(move || {
                    if let Some(pipe) = pipe.upgrade() {
                        pipe.disconnect();
                    }
                });
            })
        };
        let listeners = vec![
            ("dataChannelOpen", on_open),
            ("dataChannelMessage", on_message),
            ("rtcParticipantError", on_error.clone()),
            ("dataChannelError", on_error),
            ("dataChannelClose", on_close.clone()),
            ("peerClose", on_close),
        ];
        for (kind, listener) in &listeners {
            peer.on(kind, listener);
        }
        *transport.listeners.borrow_mut() = listeners;
        pipe
    }
}

/// Client pipes send through the joiner's data channel
struct JoinerTransport {
    joiner: RtcJoiner,
    event_loop: EventLoop,
    listeners: ListenerSet,
}

impl Transport for JoinerTransport {
    fn transmit(&self, _: &Pipe, text: String) -> Result<(), Box<dyn Error>> {
        self.joiner.send(&text)
    }

    fn teardown(&self, pipe: &Pipe) {
        detach(&self.joiner, &self.listeners);
        trace!("{} releasing {}", pipe.describe(), self.joiner.describe());
        let joiner = self.joiner.clone();
        self.event_loop.defer(move || joiner.dispose());
    }
}

pub struct WebRtcClientPipe;

impl WebRtcClientPipe {
    /// Starts a joiner against the signaling server. The pipe emits "open" once the data
    /// channel is up; negotiation failures arrive as "error" (field "errorType") followed by
    /// "close".
    pub fn connect(
        context: &RtcContext,
        config: ActorConfig,
        settings: &PipeSettings,
    ) -> Result<Pipe, Box<dyn Error>> {
        let url = config.resolve(&context.settings).signaling_url;
        if url.is_empty() {
            return Err(PipeError::BadUrl(url).into());
        }
        let joiner = RtcJoiner::new(context, &config)?;
        let transport = Rc::new(JoinerTransport {
            joiner: joiner.clone(),
            event_loop: context.event_loop.clone(),
            listeners: RefCell::new(Vec::new()),
        });
        let pipe = Pipe::new(
            TransportKind::WebRtc,
            PipeSubtype::Client,
            &format!("rtc_client_pipe-{}", url),
            settings,
            transport.clone(),
        );
        pipe.set_remote_address(&url);
        let auto_close_signaling = context.settings.auto_close_signaling_pipe;
        let on_open = {
            let pipe = pipe.downgrade();
            listener(move |event| {
                let pipe = match pipe.upgrade() {
                    Some(pipe) => pipe,
                    None => return,
                };
                if !pipe.mark_connected() {
                    return;
                }
                pipe.emit_open();
                if let (true, Some(joiner)) = (auto_close_signaling, event.get::<RtcJoiner>()) {
                    joiner.close_signaling();
                }
            })
        };
        let on_message = {
            let pipe = pipe.downgrade();
            listener(move |event| {
                if let (Some(pipe), Some(data)) = (pipe.upgrade(), event.str_field("data")) {
                    pipe.receive(data);
                }
            })
        };
        let error_reporter = |error_type: &'static str, then_disconnect: bool| {
            let pipe = pipe.downgrade();
            listener(move |event| {
                if let Some(pipe) = pipe.upgrade() {
                    let error = event.str_field("error").unwrap_or(error_type);
                    pipe.emit(
                        Event::new("error")
                            .with("message", error)
                            .with("errorType", error_type),
                    );
                    if then_disconnect {
                        pipe.disconnect();
                    }
                }
            })
        };
        let on_close = {
            let pipe = pipe.downgrade();
            let event_loop = context.event_loop.clone();
            listener(move |_| {
                let pipe = pipe.clone();
                event_loop.defer(move || {
                    if let Some(pipe) = pipe.upgrade() {
                        pipe.disconnect();
                    }
                });
            })
        };
        let listeners = vec![
            ("dataChannelOpen", on_open),
            ("dataChannelMessage", on_message),
            ("rtcParticipantError", error_reporter("rtcParticipantError", true)),
            ("dataChannelError", error_reporter("dataChannelError", false)),
            ("signalingPipeError", error_reporter("signalingPipeError", false)),
            ("dataChannelClose", on_close),
        ];
        for (kind, listener) in &listeners {
            joiner.on(kind, listener);
        }
        *transport.listeners.borrow_mut() = listeners;
        Ok(pipe)
    }
}
