use super::*;

/// A signaling server on a local endpoint, and a WebRTC acceptor and client pipes that reach
/// it through the loopback network
struct Rendezvous {
    event_loop: EventLoop,
    manager: SignalingManager,
    context: RtcContext,
    _registry: EndpointRegistry,
    _signaling_acceptor: LocalAcceptor,
    server: SignalingServer,
}

fn rendezvous() -> Rendezvous {
    let event_loop = EventLoop::new_manual();
    let registry = EndpointRegistry::new();
    let signaling_acceptor = LocalAcceptor::new(
        Some("signaling"),
        &registry,
        &event_loop,
        &PipeSettings::default(),
    )
    .unwrap();
    let manager = SignalingManager::default();
    let server = SignalingServer::new(
        &signaling_acceptor,
        &manager,
        &DiscoverySettings {
            period: Duration::from_millis(100),
            step_count: 5,
        },
    );
    let network = LoopbackNetwork::new(&event_loop);
    let context = RtcContext::new(&event_loop, Rc::new(network), local_signaling(&registry));
    Rendezvous {
        event_loop,
        manager,
        context,
        _registry: registry,
        _signaling_acceptor: signaling_acceptor,
        server,
    }
}

impl Rendezvous {
    fn accept(&self) -> WebRtcAcceptor {
        WebRtcAcceptor::new(
            &self.context,
            &ActorConfig::new("signaling").with_participant("creator-1"),
            &WebRtcAcceptorSettings {
                max_active_offers: 1,
                ..WebRtcAcceptorSettings::default()
            },
            &PipeSettings::default(),
        )
        .unwrap()
    }

    fn join(&self) -> Pipe {
        WebRtcClientPipe::connect(
            &self.context,
            ActorConfig::new("signaling").with_participant("joiner-1"),
            &PipeSettings::default(),
        )
        .unwrap()
    }

    fn default_space(&self) -> Option<SignalingSpace> {
        self.manager
            .category_get(DEFAULT_CATEGORY, false)
            .and_then(|category| category.space_get(DEFAULT_SPACE, false))
    }
}

#[test]
fn creator_and_joiner_meet_and_talk() {
    let r = rendezvous();
    let acceptor = r.accept();
    let accepted = RecordedEvents::new(acceptor.acceptor(), &["identified", "connection"]);
    r.event_loop.run_ready();
    assert_eq!(r.default_space().unwrap().pending_offer_count(), 1);

    let client = r.join();
    let client_events = RecordedEvents::new(&client, &["open", "message"]);
    r.event_loop.run_ready();

    accepted.assert_kinds(&["identified", "connection"]);
    assert_eq!(accepted.field(0, "idSomebodyOtherSide"), json!("joiner-1"));
    let peer = accepted.get(0).get::<ServerPeer>().cloned().unwrap();
    assert_eq!(peer.id_offer(), 1);
    assert_eq!(peer.other_side().as_deref(), Some("joiner-1"));
    client_events.assert_kinds(&["open"]);
    assert!(client.is_connected());

    let server_pipe = accepted.get(1).get::<Pipe>().cloned().unwrap();
    let server_events = RecordedEvents::new(&server_pipe, &["message"]);
    client.send(json!({"ping": 1})).unwrap();
    r.event_loop.run_ready();
    assert_eq!(server_events.fields("message"), vec![json!({"ping": 1})]);
    server_pipe.send(json!({"pong": 1})).unwrap();
    r.event_loop.run_ready();
    assert_eq!(client_events.fields("message"), vec![json!({"pong": 1})]);
}

#[test]
fn joiner_drops_signaling_once_connected() {
    let r = rendezvous();
    let _acceptor = r.accept();
    r.event_loop.run_ready();
    let client = r.join();
    r.event_loop.run_ready();
    assert!(client.is_connected());
    assert_eq!(
        r.default_space().unwrap().client_ids(),
        vec!["creator-1".to_string()]
    );
    assert_eq!(r.server.session_count(), 1);
}

#[test]
fn acceptor_keeps_an_offer_published_after_a_connection() {
    let r = rendezvous();
    let acceptor = r.accept();
    r.event_loop.run_ready();
    let _client = r.join();
    r.event_loop.run_ready();
    assert_eq!(acceptor.client_count(), 1);
    assert_eq!(acceptor.pending_offer_count(), 1);
    assert_eq!(r.default_space().unwrap().pending_offer_count(), 1);
}

#[test]
fn joiner_waits_for_a_late_offer() {
    let r = rendezvous();
    let client = r.join();
    let client_events = RecordedEvents::new(&client, &["open", "error"]);
    r.event_loop.run_ready();
    let _acceptor = r.accept();
    r.event_loop.run_ready();
    client_events.assert_kinds(&[]);
    r.event_loop.advance(Duration::from_millis(100));
    r.event_loop.run_ready();
    client_events.assert_kinds(&["open"]);
}

#[test]
fn joiner_without_creator_gives_up() {
    let r = rendezvous();
    let client = r.join();
    let client_events = RecordedEvents::new(&client, &["open", "error"]);
    r.event_loop.run_ready();
    r.event_loop.advance(Duration::from_millis(300));
    client_events.assert_kinds(&[]);
    r.event_loop.advance(Duration::from_millis(100));
    r.event_loop.run_ready();
    client_events.assert_kinds(&["error"]);
    assert_eq!(client_events.field(0, "message"), json!("no offer found"));
    assert!(!client.is_connected());
    assert_eq!(r.server.session_count(), 0);
    assert!(r.manager.category_ids().is_empty());
}

#[test]
fn disposing_the_acceptor_empties_the_namespace() {
    let r = rendezvous();
    let acceptor = r.accept();
    r.event_loop.run_ready();
    assert!(r.default_space().is_some());
    acceptor.dispose();
    r.event_loop.run_ready();
    assert!(r.default_space().is_none());
    assert!(r.manager.category_ids().is_empty());
    assert_eq!(r.server.session_count(), 0);
}
