use super::*;
use super::transport::NullTransport;

pub const DEFAULT_MAX_ACCUMULATED_MESSAGES: usize = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct PipeSettings {
    /// send() buffers envelopes until this many are pending. 1 or 0 sends immediately.
    pub max_accumulated_messages: usize,
    /// How long a WebSocket client waits before reconnecting after a failed attempt. Zero
    /// disables reconnecting.
    pub ws_reconnect_after: Duration,
}

impl Default for PipeSettings {
    fn default() -> Self {
        Self {
            max_accumulated_messages: DEFAULT_MAX_ACCUMULATED_MESSAGES,
            ws_reconnect_after: Duration::from_millis(100),
        }
    }
}

struct Owner {
    acceptor: WeakAcceptor,
    key: String,
}

struct PipeState {
    url: String,
    remote_address: String,
    is_connected: bool,
    is_disposing: bool,
    close_emitted: bool,
    accumulated: Vec<Value>,
    max_accumulated: usize,
    relay_client: Option<Pipe>,
    owner: Option<Owner>,
}

struct PipeImpl {
    events: EventDispatcher,
    kind: TransportKind,
    subtype: PipeSubtype,
    state: RefCell<PipeState>,
    /// Taken when the pipe disconnects
    transport: RefCell<Option<Rc<dyn Transport>>>,
}

/// A bidirectional buffered message endpoint. Clones refer to the same pipe.
///
/// Events: "open", "message" (field "message" holds the envelope), "error" (field "message"),
/// "close" (exactly once) and "dispose". Every event carries the pipe as an attachment.
#[derive(Clone)]
pub struct Pipe(Rc<PipeImpl>);

#[derive(Clone, Default)]
pub struct WeakPipe(Weak<PipeImpl>);

impl WeakPipe {
    pub fn upgrade(&self) -> Option<Pipe> {
        self.0.upgrade().map(Pipe)
    }
}

impl Pipe {
    /// Creates a disconnected pipe. The transport flips it to connected once its handshake is
    /// done.
    pub fn new(
        kind: TransportKind,
        subtype: PipeSubtype,
        url: &str,
        settings: &PipeSettings,
        transport: Rc<dyn Transport>,
    ) -> Self {
        Self(Rc::new(PipeImpl {
            events: EventDispatcher::new(),
            kind,
            subtype,
            state: RefCell::new(PipeState {
                url: url.to_string(),
                remote_address: String::new(),
                is_connected: false,
                is_disposing: false,
                close_emitted: false,
                accumulated: Vec::new(),
                max_accumulated: settings.max_accumulated_messages,
                relay_client: None,
                owner: None,
            }),
            transport: RefCell::new(Some(transport)),
        }))
    }

    /// A pipe that is always connected and discards everything sent to it
    pub fn null() -> Self {
        let pipe = Self::new(
            TransportKind::Null,
            PipeSubtype::Loopback,
            "null_pipe://",
            &PipeSettings::default(),
            Rc::new(NullTransport),
        );
        pipe.0.state.borrow_mut().is_connected = true;
        pipe
    }

    pub fn kind(&self) -> TransportKind {
        self.0.kind
    }

    pub fn subtype(&self) -> PipeSubtype {
        self.0.subtype
    }

    pub fn url(&self) -> String {
        self.0.state.borrow().url.clone()
    }

    pub fn remote_address(&self) -> String {
        self.0.state.borrow().remote_address.clone()
    }

    pub fn set_remote_address(&self, address: &str) {
        self.0.state.borrow_mut().remote_address = address.to_string();
    }

    pub fn is_null(&self) -> bool {
        self.0.kind == TransportKind::Null
    }

    pub fn is_connected(&self) -> bool {
        let state = self.0.state.borrow();
        state.is_connected && !state.is_disposing
    }

    pub fn is_disposed(&self) -> bool {
        self.0.state.borrow().is_disposing
    }

    pub fn max_accumulated(&self) -> usize {
        self.0.state.borrow().max_accumulated
    }

    pub fn set_max_accumulated(&self, max: usize) {
        self.0.state.borrow_mut().max_accumulated = max;
    }

    pub fn accumulated_count(&self) -> usize {
        self.0.state.borrow().accumulated.len()
    }

    pub fn relay_client(&self) -> Option<Pipe> {
        self.0.state.borrow().relay_client.clone()
    }

    /// Attaches a pipe that is flushed after this one and disposed with it
    pub fn set_relay_client(&self, relay_client: Option<Pipe>) {
        self.0.state.borrow_mut().relay_client = relay_client;
    }

    pub fn downgrade(&self) -> WeakPipe {
        WeakPipe(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Pipe) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Stable identity of the pipe while it is alive, usable as a map key
    pub fn id(&self) -> usize {
        self.0.thin_ptr() as usize
    }

    pub fn describe(&self) -> String {
        format!("{} {} pipe {}", self.kind(), self.subtype(), self.url())
    }

    pub(crate) fn set_owner(&self, acceptor: &Acceptor, key: &str) {
        self.0.state.borrow_mut().owner = Some(Owner {
            acceptor: acceptor.downgrade(),
            key: key.to_string(),
        });
    }

    /// Called by transports once the handshake is done. Returns false if the pipe has already
    /// been torn down.
    pub fn mark_connected(&self) -> bool {
        if self.0.transport.borrow().is_none() {
            return false;
        }
        let mut state = self.0.state.borrow_mut();
        if state.is_disposing {
            return false;
        }
        state.is_connected = true;
        true
    }

    pub(crate) fn emit(&self, event: Event) {
        self.0.events.dispatch(&event.attach(self.clone()));
    }

    pub fn emit_open(&self) {
        self.emit(Event::new("open"));
    }

    pub fn emit_error(&self, message: &str) {
        self.emit(Event::new("error").with("message", message));
    }

    fn emit_close(&self) {
        let first = !std::mem::replace(&mut self.0.state.borrow_mut().close_emitted, true);
        if first {
            self.emit(Event::new("close"));
        }
    }

    fn transmit(&self, text: String) -> Result<(), Box<dyn Error>> {
        let transport = self.0.transport.borrow().clone();
        let transport = match transport {
            Some(transport) => transport,
            None => return Err(PipeError::NoTransport(self.describe()).into()),
        };
        transport.transmit(self, text).map_err(|e| {
            self.emit_error(&e.to_string());
            e
        })
    }

    /// Same as send_with(data, true)
    pub fn send<P: Into<Payload>>(&self, data: P) -> Result<(), Box<dyn Error>> {
        self.send_with(data, true)
    }

    /// Sends immediately if the accumulation threshold is 1 or less. Otherwise buffers the
    /// envelope and flushes if the threshold is reached or flush is true. Does nothing while
    /// disconnected.
    pub fn send_with<P: Into<Payload>>(&self, data: P, flush: bool) -> Result<(), Box<dyn Error>> {
        if self.is_null() || !self.is_connected() {
            return Ok(());
        }
        let payload = data.into();
        let threshold = self.max_accumulated();
        if threshold <= 1 {
            return self.transmit(payload.marshal());
        }
        let should_flush = {
            let mut state = self.0.state.borrow_mut();
            state.accumulated.push(payload.into_value());
            flush || state.accumulated.len() >= threshold
        };
        if should_flush {
            self.flush()
        } else {
            Ok(())
        }
    }

    /// Transmits buffered envelopes, batched if there is more than one, then flushes the relay
    /// client
    pub fn flush(&self) -> Result<(), Box<dyn Error>> {
        if self.is_null() || !self.is_connected() {
            return Ok(());
        }
        // Taken before transmitting so re-entrant sends don't see (and resend) these
        let pending = std::mem::take(&mut self.0.state.borrow_mut().accumulated);
        let text = match pending.len() {
            0 => return Ok(()),
            1 => pending[0].to_string(),
            _ => encode_batch(&pending),
        };
        if let Err(e) = self.transmit(text) {
            let mut state = self.0.state.borrow_mut();
            let mut newer = std::mem::replace(&mut state.accumulated, pending);
            state.accumulated.append(&mut newer);
            return Err(e);
        }
        if let Some(relay_client) = self.relay_client() {
            relay_client.flush()?;
        }
        Ok(())
    }

    /// Decodes wire data and emits a "message" event per envelope, unwrapping batches in order
    pub fn receive<P: Into<Payload>>(&self, data: P) {
        if self.is_null() || !self.is_connected() {
            return;
        }
        for message in WireMessage::decode(data.into()).into_values() {
            self.emit(Event::new("message").with("message", message));
        }
    }

    /// Marks the pipe disconnected, unregisters it from its acceptor, emits "close" if it was
    /// connected and releases the transport
    pub fn disconnect(&self) {
        if self.is_null() {
            return;
        }
        let (was_connected, owner) = {
            let mut state = self.0.state.borrow_mut();
            (
                std::mem::replace(&mut state.is_connected, false),
                state.owner.take(),
            )
        };
        if let Some(owner) = owner {
            if let Some(acceptor) = owner.acceptor.upgrade() {
                acceptor.unregister_client_by_key(&owner.key);
            }
        }
        let transport = self.0.transport.borrow_mut().take();
        if was_connected {
            self.emit_close();
        }
        if let Some(transport) = transport {
            transport.teardown(self);
        }
    }

    /// The owning acceptor is going away and has already forgotten this pipe
    pub(crate) fn handle_acceptor_gone(&self) {
        self.0.state.borrow_mut().owner = None;
        self.disconnect();
        self.dispose();
    }

    /// Disposes the relay client, disconnects, drops buffered envelopes and listeners. Safe to
    /// call more than once.
    pub fn dispose(&self) {
        let relay_client = {
            let mut state = self.0.state.borrow_mut();
            if state.is_disposing {
                return;
            }
            state.is_disposing = true;
            state.relay_client.take()
        };
        if let Some(relay_client) = relay_client {
            relay_client.dispose();
        }
        if self.is_null() {
            self.0.state.borrow_mut().is_connected = false;
        } else {
            self.disconnect();
        }
        self.0.state.borrow_mut().accumulated.clear();
        self.0.events.dispose();
    }
}

impl EventSource for Pipe {
    fn dispatcher(&self) -> &EventDispatcher {
        &self.0.events
    }
}

impl Debug for Pipe {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(max: usize) -> (Pipe, MockTransport) {
        let transport = MockTransport::new();
        let settings = PipeSettings {
            max_accumulated_messages: max,
            ..PipeSettings::default()
        };
        let pipe = Pipe::new(
            TransportKind::Local,
            PipeSubtype::Client,
            "test://",
            &settings,
            transport.boxed(),
        );
        assert!(pipe.mark_connected());
        (pipe, transport)
    }

    #[test]
    fn new_pipe_is_disconnected() {
        let pipe = Pipe::new(
            TransportKind::Local,
            PipeSubtype::Server,
            "x",
            &PipeSettings::default(),
            MockTransport::new().boxed(),
        );
        assert!(!pipe.is_connected());
        assert_eq!(pipe.max_accumulated(), 30);
    }

    #[test]
    fn threshold_one_sends_immediately() {
        let (pipe, transport) = setup(1);
        pipe.send_with(json!({"a": 1}), false).unwrap();
        transport.assert_sent(&["{\"a\":1}"]);
        assert_eq!(pipe.accumulated_count(), 0);
    }

    #[test]
    fn threshold_one_send_matches_send_then_flush() {
        let (a, a_transport) = setup(1);
        let (b, b_transport) = setup(1);
        a.send(json!({"x": 2})).unwrap();
        b.send_with(json!({"x": 2}), false).unwrap();
        b.flush().unwrap();
        assert_eq!(a_transport.sent(), b_transport.sent());
    }

    #[test]
    fn buffers_until_flush() {
        let (pipe, transport) = setup(30);
        pipe.send_with(json!({"n": 1}), false).unwrap();
        pipe.send_with(json!({"n": 2}), false).unwrap();
        transport.assert_sent(&[]);
        assert_eq!(pipe.accumulated_count(), 2);
        pipe.flush().unwrap();
        transport.assert_sent(&["{\"arr_packed_messages\":[{\"n\":1},{\"n\":2}]}"]);
        assert_eq!(pipe.accumulated_count(), 0);
    }

    #[test]
    fn single_buffered_envelope_is_not_batched() {
        let (pipe, transport) = setup(30);
        pipe.send(json!({"n": 1})).unwrap();
        transport.assert_sent(&["{\"n\":1}"]);
    }

    #[test]
    fn text_payload_is_buffered_decoded() {
        let (pipe, transport) = setup(30);
        pipe.send_with("{\"n\": 1}", false).unwrap();
        pipe.send_with("{\"n\": 2}", true).unwrap();
        transport.assert_sent(&["{\"arr_packed_messages\":[{\"n\":1},{\"n\":2}]}"]);
    }

    #[test]
    fn flushes_when_threshold_reached() {
        let (pipe, transport) = setup(3);
        pipe.send_with(json!(1), false).unwrap();
        pipe.send_with(json!(2), false).unwrap();
        transport.assert_sent(&[]);
        pipe.send_with(json!(3), false).unwrap();
        transport.assert_sent(&["{\"arr_packed_messages\":[1,2,3]}"]);
    }

    #[test]
    fn flush_with_empty_buffer_does_nothing() {
        let (pipe, transport) = setup(30);
        pipe.flush().unwrap();
        transport.assert_sent(&[]);
    }

    #[test]
    fn send_while_disconnected_is_a_noop() {
        let transport = MockTransport::new();
        let pipe = Pipe::new(
            TransportKind::Local,
            PipeSubtype::Client,
            "x",
            &PipeSettings::default(),
            transport.boxed(),
        );
        pipe.send(json!({"a": 1})).unwrap();
        pipe.flush().unwrap();
        transport.assert_sent(&[]);
        assert_eq!(pipe.accumulated_count(), 0);
    }

    #[test]
    fn transport_error_is_returned_and_dispatched() {
        let (pipe, transport) = setup(1);
        let events = RecordedEvents::new(&pipe, &["error"]);
        transport.fail_with("wire is cut");
        let err = pipe.send(json!({"a": 1})).unwrap_err();
        assert_eq!(err.to_string(), "wire is cut");
        events.assert_kinds(&["error"]);
        assert_eq!(events.field(0, "message"), json!("wire is cut"));
    }

    #[test]
    fn failed_flush_keeps_buffer() {
        let (pipe, transport) = setup(30);
        pipe.send_with(json!(1), false).unwrap();
        pipe.send_with(json!(2), false).unwrap();
        transport.fail_with("nope");
        assert!(pipe.flush().is_err());
        assert_eq!(pipe.accumulated_count(), 2);
        transport.stop_failing();
        pipe.flush().unwrap();
        transport.assert_sent(&["{\"arr_packed_messages\":[1,2]}"]);
    }

    #[test]
    fn receive_unwraps_batches_in_order() {
        let (pipe, _transport) = setup(30);
        let events = RecordedEvents::new(&pipe, &["message"]);
        pipe.receive(encode_batch(&[json!({"n": 1}), json!({"n": 2}), json!({"n": 3})]));
        assert_eq!(
            events.fields("message"),
            vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})]
        );
    }

    #[test]
    fn message_events_carry_the_pipe() {
        let (pipe, _transport) = setup(30);
        let seen = Rc::new(RefCell::new(None));
        let seen_clone = seen.clone();
        pipe.listen("message", move |event| {
            *seen_clone.borrow_mut() = event.get::<Pipe>().cloned();
        });
        pipe.receive(json!({"id": 1}));
        assert!(seen.borrow().as_ref().unwrap().ptr_eq(&pipe));
    }

    #[test]
    fn receive_while_disconnected_is_a_noop() {
        let (pipe, _transport) = setup(30);
        let events = RecordedEvents::new(&pipe, &["message"]);
        pipe.disconnect();
        pipe.receive(json!({"n": 1}));
        events.assert_kinds(&[]);
    }

    #[test]
    fn disconnect_emits_close_once_and_tears_down_transport() {
        let (pipe, transport) = setup(30);
        let events = RecordedEvents::new(&pipe, &["close"]);
        pipe.disconnect();
        pipe.disconnect();
        events.assert_kinds(&["close"]);
        assert_eq!(transport.teardown_count(), 1);
        assert!(!pipe.is_connected());
    }

    #[test]
    fn dispose_twice_emits_one_close_and_one_dispose() {
        let (pipe, _transport) = setup(30);
        let events = RecordedEvents::new(&pipe, &["close", "dispose"]);
        pipe.dispose();
        pipe.dispose();
        events.assert_kinds(&["close", "dispose"]);
        assert!(pipe.is_disposed());
    }

    #[test]
    fn dispose_clears_buffer() {
        let (pipe, transport) = setup(30);
        pipe.send_with(json!(1), false).unwrap();
        pipe.dispose();
        assert_eq!(pipe.accumulated_count(), 0);
        transport.assert_sent(&[]);
    }

    #[test]
    fn dispose_disposes_relay_client() {
        let (pipe, _transport) = setup(30);
        let (relay, relay_transport) = setup(30);
        pipe.set_relay_client(Some(relay.clone()));
        pipe.dispose();
        assert!(relay.is_disposed());
        assert_eq!(relay_transport.teardown_count(), 1);
    }

    #[test]
    fn flush_cascades_to_relay_client() {
        let (pipe, _transport) = setup(30);
        let (relay, relay_transport) = setup(30);
        pipe.set_relay_client(Some(relay.clone()));
        relay.send_with(json!({"r": 1}), false).unwrap();
        pipe.send_with(json!({"p": 1}), false).unwrap();
        pipe.flush().unwrap();
        relay_transport.assert_sent(&["{\"r\":1}"]);
    }

    #[test]
    fn sending_without_a_transport_is_an_error() {
        let (pipe, _transport) = setup(30);
        pipe.0.transport.borrow_mut().take();
        pipe.send_with(json!({"a": 1}), false).unwrap();
        let e = pipe.flush().unwrap_err();
        assert_eq!(
            e.downcast_ref::<PipeError>(),
            Some(&PipeError::NoTransport(pipe.describe()))
        );
        assert_eq!(pipe.0.state.borrow().accumulated.len(), 1);
        assert!(pipe.is_connected());
    }

    #[test]
    fn mark_connected_fails_after_dispose() {
        let (pipe, _transport) = setup(30);
        pipe.dispose();
        assert!(!pipe.mark_connected());
        assert!(!pipe.is_connected());
    }

    #[test]
    fn null_pipe_is_connected_and_swallows_everything() {
        let pipe = Pipe::null();
        let events = RecordedEvents::new(&pipe, &["message", "close"]);
        assert!(pipe.is_connected());
        pipe.send(json!({"a": 1})).unwrap();
        pipe.receive(json!({"a": 1}));
        pipe.disconnect();
        assert!(pipe.is_connected());
        events.assert_kinds(&[]);
        assert_eq!(pipe.kind(), TransportKind::Null);
    }

    #[test]
    fn null_pipe_dispose_is_idempotent() {
        let pipe = Pipe::null();
        let events = RecordedEvents::new(&pipe, &["dispose"]);
        pipe.dispose();
        pipe.dispose();
        events.assert_kinds(&["dispose"]);
        assert!(!pipe.is_connected());
    }

    #[test]
    fn describe_mentions_kind_subtype_and_url() {
        let (pipe, _transport) = setup(30);
        assert_eq!(pipe.describe(), "Local client pipe test://");
    }
}
