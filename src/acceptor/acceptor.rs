use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptorKind {
    Local,
    InWorker,
    WebSocket,
    WebRtc,
}

impl std::fmt::Display for AcceptorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Local => "Local",
                Self::InWorker => "InWorker",
                Self::WebSocket => "WS",
                Self::WebRtc => "WebRTC",
            }
        )
    }
}

/// What an acceptor keeps per client. Loopback transports keep both ends so both can be closed
/// when the acceptor goes away.
#[derive(Clone)]
pub enum AcceptorEntry {
    Single(Pipe),
    Pair { server: Pipe, client: Pipe },
}

impl AcceptorEntry {
    pub fn server(&self) -> &Pipe {
        match self {
            Self::Single(pipe) => pipe,
            Self::Pair { server, .. } => server,
        }
    }

    fn pipes(&self) -> Vec<Pipe> {
        match self {
            Self::Single(pipe) => vec![pipe.clone()],
            Self::Pair { server, client } => vec![server.clone(), client.clone()],
        }
    }
}

struct AcceptorState {
    is_listening: bool,
    is_disposing: bool,
    next_client_number: u64,
    clients: BTreeMap<String, AcceptorEntry>,
    /// Transport specific cleanup run on dispose (registry entries, server shutdown)
    teardown: Vec<Box<dyn FnOnce()>>,
}

struct AcceptorImpl {
    events: EventDispatcher,
    kind: AcceptorKind,
    endpoint: String,
    event_loop: EventLoop,
    settings: PipeSettings,
    state: RefCell<AcceptorState>,
}

/// Produces server-side pipes. Events: "open", "connection" (field "remoteAddress", the new
/// Pipe attached), "error" (field "message") and "dispose".
#[derive(Clone)]
pub struct Acceptor(Rc<AcceptorImpl>);

#[derive(Clone)]
pub struct WeakAcceptor(Weak<AcceptorImpl>);

impl WeakAcceptor {
    pub fn upgrade(&self) -> Option<Acceptor> {
        self.0.upgrade().map(Acceptor)
    }
}

impl Acceptor {
    pub fn new(
        kind: AcceptorKind,
        endpoint: &str,
        event_loop: &EventLoop,
        settings: &PipeSettings,
    ) -> Self {
        Self(Rc::new(AcceptorImpl {
            events: EventDispatcher::new(),
            kind,
            endpoint: endpoint.to_string(),
            event_loop: event_loop.clone(),
            settings: settings.clone(),
            state: RefCell::new(AcceptorState {
                is_listening: true,
                is_disposing: false,
                next_client_number: 1,
                clients: BTreeMap::new(),
                teardown: Vec::new(),
            }),
        }))
    }

    pub fn kind(&self) -> AcceptorKind {
        self.0.kind
    }

    pub fn endpoint(&self) -> &str {
        &self.0.endpoint
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.0.event_loop
    }

    pub fn settings(&self) -> &PipeSettings {
        &self.0.settings
    }

    pub fn is_listening(&self) -> bool {
        let state = self.0.state.borrow();
        state.is_listening && !state.is_disposing
    }

    pub fn is_disposed(&self) -> bool {
        self.0.state.borrow().is_disposing
    }

    pub fn downgrade(&self) -> WeakAcceptor {
        WeakAcceptor(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Acceptor) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn id(&self) -> usize {
        self.0.thin_ptr() as usize
    }

    /// Client numbers are unique per acceptor and start at 1
    pub fn next_client_number(&self) -> u64 {
        let mut state = self.0.state.borrow_mut();
        let number = state.next_client_number;
        state.next_client_number += 1;
        number
    }

    pub fn client_count(&self) -> usize {
        self.0.state.borrow().clients.len()
    }

    pub fn client_keys(&self) -> Vec<String> {
        self.0.state.borrow().clients.keys().cloned().collect()
    }

    pub fn server_pipe(&self, key: &str) -> Option<Pipe> {
        self.0
            .state
            .borrow()
            .clients
            .get(key)
            .map(|entry| entry.server().clone())
    }

    pub fn register_client(&self, key: &str, entry: AcceptorEntry) {
        for pipe in entry.pipes() {
            pipe.set_owner(self, key);
        }
        let replaced = self
            .0
            .state
            .borrow_mut()
            .clients
            .insert(key.to_string(), entry);
        if replaced.is_some() {
            warn!("{} acceptor {} replaced client {}", self.kind(), self.endpoint(), key);
        }
    }

    /// Forgets the client without disposing it
    pub fn unregister_client_by_key(&self, key: &str) -> bool {
        self.0.state.borrow_mut().clients.remove(key).is_some()
    }

    pub(crate) fn on_teardown<F: FnOnce() + 'static>(&self, f: F) {
        self.0.state.borrow_mut().teardown.push(Box::new(f));
    }

    pub(crate) fn emit(&self, event: Event) {
        self.0.events.dispatch(&event.attach(self.clone()));
    }

    /// Emits "open" on the next tick
    pub(crate) fn announce_open(&self) {
        let acceptor = self.downgrade();
        self.0.event_loop.defer(move || {
            if let Some(acceptor) = acceptor.upgrade() {
                if acceptor.is_listening() {
                    acceptor.emit(Event::new("open"));
                }
            }
        });
    }

    /// Emits "open" on the pipe and "connection" on the acceptor on the next tick, so whoever
    /// created the pipe can attach listeners first
    pub(crate) fn announce_connection(&self, pipe: &Pipe) {
        let acceptor = self.downgrade();
        let pipe = pipe.downgrade();
        self.0.event_loop.defer(move || {
            let (acceptor, pipe) = match (acceptor.upgrade(), pipe.upgrade()) {
                (Some(acceptor), Some(pipe)) => (acceptor, pipe),
                _ => return,
            };
            if acceptor.is_disposed() || !pipe.is_connected() {
                return;
            }
            pipe.emit_open();
            acceptor.emit(
                Event::new("connection")
                    .with("remoteAddress", pipe.remote_address())
                    .attach(pipe),
            );
        });
    }

    /// Flushes every server pipe
    pub fn flush(&self) {
        let pipes: Vec<Pipe> = self
            .0
            .state
            .borrow()
            .clients
            .values()
            .map(|entry| entry.server().clone())
            .collect();
        for pipe in pipes {
            pipe.flush().or_log_warn("flushing acceptor client");
        }
    }

    /// Creates a direct loopback connection to this acceptor and returns the client end. The
    /// server end is announced through "connection" like any other client.
    pub fn new_direct_connection(&self) -> Option<Pipe> {
        if !self.is_listening() {
            return None;
        }
        let key = self.next_client_number().to_string();
        let (server, client) = direct_pair(&self.0.settings, None);
        server.set_remote_address(&client.url());
        self.register_client(
            &key,
            AcceptorEntry::Pair {
                server: server.clone(),
                client: client.clone(),
            },
        );
        self.announce_connection(&server);
        let deferred_client = client.downgrade();
        self.0.event_loop.defer(move || {
            if let Some(client) = deferred_client.upgrade() {
                if client.is_connected() {
                    client.emit_open();
                }
            }
        });
        Some(client)
    }

    /// Makes every owned pipe go through its close path, then forgets them all
    pub fn dispose_notify_clients(&self) {
        let clients = std::mem::take(&mut self.0.state.borrow_mut().clients);
        for (_, entry) in clients {
            for pipe in entry.pipes() {
                pipe.handle_acceptor_gone();
            }
        }
    }

    pub fn dispose(&self) {
        let teardown = {
            let mut state = self.0.state.borrow_mut();
            if state.is_disposing {
                return;
            }
            state.is_disposing = true;
            state.is_listening = false;
            std::mem::take(&mut state.teardown)
        };
        trace!("disposing {} acceptor {}", self.kind(), self.endpoint());
        for f in teardown {
            f();
        }
        self.dispose_notify_clients();
        self.0.events.dispose();
    }
}

impl EventSource for Acceptor {
    fn dispatcher(&self) -> &EventDispatcher {
        &self.0.events
    }
}

impl Debug for Acceptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} acceptor {} with {} clients",
            self.kind(),
            self.endpoint(),
            self.client_count()
        )
    }
}
