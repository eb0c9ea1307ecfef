use super::*;

/// Opens the outgoing pipe for a newly accepted incoming one
pub type CreateRelayClient = Rc<dyn Fn(&Pipe) -> Result<Pipe, Box<dyn Error>>>;

/// Relays every client of an acceptor to a fresh outgoing pipe, typically one leading out of a
/// worker. Also dispatches "connection" for each accepted client.
pub struct OutOfWorkerRelay {
    core: Rc<RelayCore>,
    acceptor: Acceptor,
    on_connection: Listener,
}

impl OutOfWorkerRelay {
    pub fn new(
        name: &str,
        acceptor: &Acceptor,
        create_client: CreateRelayClient,
        auto_flush_incoming: bool,
        auto_flush_outgoing: bool,
    ) -> Self {
        let core = RelayCore::new(name);
        let auto_flush = AutoFlush {
            incoming: auto_flush_incoming,
            outgoing: auto_flush_outgoing,
        };
        let weak_core = Rc::downgrade(&core);
        let on_connection = acceptor.listen("connection", move |event| {
            let (core, incoming) = match (weak_core.upgrade(), event.get::<Pipe>()) {
                (Some(core), Some(incoming)) => (core, incoming.clone()),
                _ => return,
            };
            trace!(
                "relay {:?} got external client {:?}",
                core.name(),
                incoming.remote_address()
            );
            core.events().dispatch(
                &Event::new("connection")
                    .with("relayName", core.name())
                    .with("remoteAddress", incoming.remote_address())
                    .attach(incoming.clone()),
            );
            let outgoing = match create_client(&incoming) {
                Ok(outgoing) => outgoing,
                Err(e) => {
                    warn!("relay {:?} could not create client: {}", core.name(), e);
                    incoming.dispose();
                    core.emit(
                        Event::new("error").with("message", e.to_string()),
                        &incoming,
                        false,
                    );
                    return;
                }
            };
            incoming.set_relay_client(Some(outgoing.clone()));
            link_pipes(&core, &incoming, &outgoing, auto_flush);
        });
        Self {
            core,
            acceptor: acceptor.clone(),
            on_connection,
        }
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// Flushes every accepted pipe, which cascades to their outgoing counterparts
    pub fn flush(&self) {
        self.acceptor.flush();
    }

    /// Stops relaying new clients. Existing pairs keep going until one side closes.
    pub fn dispose(&self) {
        self.acceptor.off("connection", Some(&self.on_connection));
        self.core.events().dispose();
    }
}

impl EventSource for OutOfWorkerRelay {
    fn dispatcher(&self) -> &EventDispatcher {
        self.core.events()
    }
}

impl Debug for OutOfWorkerRelay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "relay {:?} for {:?}", self.name(), self.acceptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Setup {
        event_loop: EventLoop,
        acceptor: Acceptor,
        /// What the relay opened for each accepted client
        created: Rc<RefCell<Vec<(Pipe, MockTransport)>>>,
        relay: OutOfWorkerRelay,
    }

    fn setup(fail: bool) -> Setup {
        let event_loop = EventLoop::new_manual();
        let acceptor = Acceptor::new(
            AcceptorKind::Local,
            "relay_test",
            &event_loop,
            &PipeSettings::default(),
        );
        let created = Rc::new(RefCell::new(Vec::new()));
        let created_clone = created.clone();
        let relay = OutOfWorkerRelay::new(
            "ow",
            &acceptor,
            Rc::new(move |_incoming: &Pipe| -> Result<Pipe, Box<dyn Error>> {
                if fail {
                    return Err("target is down".into());
                }
                let (pipe, transport) = mock_pipe(PipeSubtype::Client);
                created_clone.borrow_mut().push((pipe.clone(), transport));
                Ok(pipe)
            }),
            true,
            true,
        );
        Setup {
            event_loop,
            acceptor,
            created,
            relay,
        }
    }

    #[test]
    fn each_connection_gets_its_own_outgoing_pipe() {
        let setup = setup(false);
        let events = RecordedEvents::new(&setup.relay, &["connection"]);
        let _a = setup.acceptor.new_direct_connection().unwrap();
        let _b = setup.acceptor.new_direct_connection().unwrap();
        setup.event_loop.run_ready();
        assert_eq!(events.count("connection"), 2);
        assert_eq!(setup.created.borrow().len(), 2);
    }

    #[test]
    fn messages_flow_through_both_ways() {
        let setup = setup(false);
        let client = setup.acceptor.new_direct_connection().unwrap();
        let client_events = RecordedEvents::new(&client, &["message"]);
        setup.event_loop.run_ready();
        client.send(json!({"id": "q"})).unwrap();
        let (outgoing, transport) = setup.created.borrow()[0].clone();
        assert_eq!(transport.sent_values(), vec![json!({"id": "q"})]);
        outgoing.receive(json!({"id": "q", "error": null}));
        assert_eq!(
            client_events.fields("message"),
            vec![json!({"id": "q", "error": null})]
        );
    }

    #[test]
    fn incoming_flush_cascades_to_outgoing() {
        let setup = setup(false);
        let client = setup.acceptor.new_direct_connection().unwrap();
        let client_events = RecordedEvents::new(&client, &["message"]);
        setup.event_loop.run_ready();
        let incoming = setup.acceptor.server_pipe("1").unwrap();
        let (outgoing, transport) = setup.created.borrow()[0].clone();
        outgoing.set_max_accumulated(30);
        incoming.send_with(json!({"to": "client"}), false).unwrap();
        outgoing.send_with(json!({"to": "target"}), false).unwrap();
        transport.assert_sent(&[]);
        setup.relay.flush();
        assert_eq!(client_events.fields("message"), vec![json!({"to": "client"})]);
        assert_eq!(transport.sent_values(), vec![json!({"to": "target"})]);
    }

    #[test]
    fn closing_the_client_disposes_the_outgoing_pipe() {
        let setup = setup(false);
        let client = setup.acceptor.new_direct_connection().unwrap();
        let events = RecordedEvents::new(&setup.relay, &["close"]);
        setup.event_loop.run_ready();
        client.disconnect();
        let (outgoing, transport) = setup.created.borrow()[0].clone();
        assert!(outgoing.is_disposed());
        assert_eq!(transport.teardown_count(), 1);
        events.assert_kinds(&["close"]);
        assert_eq!(events.field(0, "isExternalSocket"), json!(true));
    }

    #[test]
    fn failing_to_create_client_disposes_incoming() {
        let setup = setup(true);
        let events = RecordedEvents::new(&setup.relay, &["connection", "error"]);
        let client = setup.acceptor.new_direct_connection().unwrap();
        let client_events = RecordedEvents::new(&client, &["close"]);
        setup.event_loop.run_ready();
        events.assert_kinds(&["connection", "error"]);
        assert_eq!(events.field(1, "message"), json!("target is down"));
        client_events.assert_kinds(&["close"]);
        assert_eq!(setup.acceptor.client_count(), 0);
    }

    #[test]
    fn disposed_relay_ignores_new_connections() {
        let setup = setup(false);
        setup.relay.dispose();
        let _client = setup.acceptor.new_direct_connection().unwrap();
        setup.event_loop.run_ready();
        assert!(setup.created.borrow().is_empty());
    }
}
