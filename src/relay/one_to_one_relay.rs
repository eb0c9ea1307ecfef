use super::*;

/// Splices two existing pipes
pub struct OneToOneRelay {
    core: Rc<RelayCore>,
    incoming: Pipe,
    outgoing: Pipe,
}

impl OneToOneRelay {
    pub fn new(
        name: &str,
        incoming: &Pipe,
        outgoing: &Pipe,
        auto_flush_incoming: bool,
        auto_flush_outgoing: bool,
    ) -> Self {
        let core = RelayCore::new(name);
        link_pipes(
            &core,
            incoming,
            outgoing,
            AutoFlush {
                incoming: auto_flush_incoming,
                outgoing: auto_flush_outgoing,
            },
        );
        Self {
            core,
            incoming: incoming.clone(),
            outgoing: outgoing.clone(),
        }
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn flush(&self) {
        self.incoming.flush().or_log_warn("flushing relay incoming pipe");
        self.outgoing.flush().or_log_warn("flushing relay outgoing pipe");
    }

    /// Drops the relay's own listeners. The pipes stay as they are.
    pub fn dispose(&self) {
        self.core.events().dispose();
    }
}

impl EventSource for OneToOneRelay {
    fn dispatcher(&self) -> &EventDispatcher {
        self.core.events()
    }
}

impl Debug for OneToOneRelay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "relay {:?} between {} and {}",
            self.name(),
            self.incoming.describe(),
            self.outgoing.describe()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(flush_in: bool, flush_out: bool) -> (Pipe, MockTransport, Pipe, MockTransport, OneToOneRelay) {
        let (incoming, incoming_transport) = mock_pipe(PipeSubtype::Server);
        let (outgoing, outgoing_transport) = mock_pipe(PipeSubtype::Client);
        incoming.set_remote_address("1.2.3.4:5");
        let relay = OneToOneRelay::new("r", &incoming, &outgoing, flush_in, flush_out);
        (incoming, incoming_transport, outgoing, outgoing_transport, relay)
    }

    #[test]
    fn forwards_both_directions() {
        let (incoming, incoming_transport, outgoing, outgoing_transport, _relay) = setup(true, true);
        incoming.receive(json!({"id": 1}));
        outgoing.receive(json!({"id": 2}));
        assert_eq!(outgoing_transport.sent_values(), vec![json!({"id": 1})]);
        assert_eq!(incoming_transport.sent_values(), vec![json!({"id": 2})]);
    }

    #[test]
    fn relay_events_are_stamped() {
        let (incoming, _it, outgoing, _ot, relay) = setup(true, true);
        let events = RecordedEvents::new(&relay, &["message"]);
        incoming.receive(json!({"id": 1}));
        outgoing.receive(json!({"id": 2}));
        assert_eq!(events.fields("isExternalSocket"), vec![json!(true), json!(false)]);
        assert_eq!(events.fields("relayName"), vec![json!("r"), json!("r")]);
        assert_eq!(events.field(0, "remoteAddress"), json!("1.2.3.4:5"));
        assert_eq!(events.field(1, "message"), json!({"id": 2}));
    }

    #[test]
    fn flush_policy_is_per_direction() {
        let (incoming, incoming_transport, outgoing, outgoing_transport, relay) = setup(false, true);
        incoming.set_max_accumulated(30);
        outgoing.set_max_accumulated(30);
        incoming.receive(json!({"a": 1}));
        outgoing.receive(json!({"b": 1}));
        outgoing_transport.assert_sent(&[]);
        assert_eq!(incoming_transport.sent_values(), vec![json!({"b": 1})]);
        relay.flush();
        assert_eq!(outgoing_transport.sent_values(), vec![json!({"a": 1})]);
    }

    #[test]
    fn close_on_either_side_tears_down_both_once() {
        let (incoming, incoming_transport, outgoing, outgoing_transport, relay) = setup(true, true);
        let events = RecordedEvents::new(&relay, &["close", "error"]);
        outgoing.disconnect();
        events.assert_kinds(&["close"]);
        assert_eq!(events.field(0, "isExternalSocket"), json!(false));
        assert!(incoming.is_disposed());
        assert!(outgoing.is_disposed());
        assert_eq!(incoming_transport.teardown_count(), 1);
        assert_eq!(outgoing_transport.teardown_count(), 1);
    }

    #[test]
    fn error_tears_down_and_reports_message() {
        let (incoming, _it, outgoing, _ot, relay) = setup(true, true);
        let events = RecordedEvents::new(&relay, &["close", "error"]);
        incoming.emit_error("boom");
        events.assert_kinds(&["error"]);
        assert_eq!(events.field(0, "message"), json!("boom"));
        assert_eq!(events.field(0, "isExternalSocket"), json!(true));
        assert!(outgoing.is_disposed());
        assert!(incoming.is_disposed());
    }

    #[test]
    fn nothing_is_forwarded_after_teardown() {
        let (incoming, _it, outgoing, outgoing_transport, _relay) = setup(true, true);
        incoming.disconnect();
        incoming.receive(json!({"late": true}));
        outgoing.flush().unwrap();
        outgoing_transport.assert_sent(&[]);
    }

    #[test]
    fn empty_name_becomes_unnamed() {
        let (incoming, _) = mock_pipe(PipeSubtype::Server);
        let (outgoing, _) = mock_pipe(PipeSubtype::Client);
        let relay = OneToOneRelay::new("", &incoming, &outgoing, true, true);
        assert_eq!(relay.name(), "unnamed");
    }
}
