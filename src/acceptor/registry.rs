use super::*;
use super::in_worker_acceptor::WeakInWorkerAcceptor;

enum Registered {
    Acceptor(WeakAcceptor),
    InWorker(WeakInWorkerAcceptor),
}

impl Registered {
    fn is_alive(&self) -> bool {
        match self {
            Self::Acceptor(acceptor) => acceptor
                .upgrade()
                .map_or(false, |acceptor| !acceptor.is_disposed()),
            Self::InWorker(acceptor) => acceptor
                .upgrade()
                .map_or(false, |acceptor| !acceptor.is_disposed()),
        }
    }

    fn id(&self) -> Option<usize> {
        match self {
            Self::Acceptor(acceptor) => acceptor.upgrade().map(|a| a.id()),
            Self::InWorker(acceptor) => acceptor.upgrade().map(|a| a.id()),
        }
    }
}

fn port_key(port: u16) -> String {
    format!("ws_port:{}", port)
}

/// Who is listening where. Local and in-worker acceptors share the endpoint namespace; WebSocket
/// acceptors register their port. Create one per process (or per test) and hand it to every
/// acceptor and client that needs to find one.
#[derive(Clone, Default)]
pub struct EndpointRegistry(Rc<RefCell<HashMap<String, Registered>>>);

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, endpoint: &str) -> bool {
        self.0
            .borrow()
            .get(endpoint)
            .map_or(false, Registered::is_alive)
    }

    pub fn is_port_registered(&self, port: u16) -> bool {
        self.is_registered(&port_key(port))
    }

    fn register(&self, key: &str, entry: Registered, error: PipeError) -> Result<(), PipeError> {
        let mut map = self.0.borrow_mut();
        if map.get(key).map_or(false, Registered::is_alive) {
            return Err(error);
        }
        map.insert(key.to_string(), entry);
        Ok(())
    }

    pub(crate) fn register_local(&self, endpoint: &str, acceptor: &Acceptor) -> Result<(), PipeError> {
        self.register(
            endpoint,
            Registered::Acceptor(acceptor.downgrade()),
            PipeError::AlreadyListening(endpoint.to_string()),
        )
    }

    pub(crate) fn register_in_worker(
        &self,
        endpoint: &str,
        acceptor: &InWorkerAcceptor,
    ) -> Result<(), PipeError> {
        self.register(
            endpoint,
            Registered::InWorker(acceptor.downgrade()),
            PipeError::AlreadyListening(endpoint.to_string()),
        )
    }

    pub(crate) fn register_port(&self, port: u16, acceptor: &Acceptor) -> Result<(), PipeError> {
        self.register(
            &port_key(port),
            Registered::Acceptor(acceptor.downgrade()),
            PipeError::PortInUse(port),
        )
    }

    /// Removes the entry if it still belongs to the acceptor with the given id (or is dead)
    pub(crate) fn unregister(&self, key: &str, id: usize) {
        let mut map = self.0.borrow_mut();
        let owned = map
            .get(key)
            .map_or(false, |entry| entry.id().map_or(true, |entry_id| entry_id == id));
        if owned {
            map.remove(key);
        }
    }

    pub(crate) fn unregister_port(&self, port: u16, id: usize) {
        self.unregister(&port_key(port), id);
    }

    pub fn local(&self, endpoint: &str) -> Option<Acceptor> {
        match self.0.borrow().get(endpoint) {
            Some(Registered::Acceptor(acceptor)) => acceptor
                .upgrade()
                .filter(|acceptor| acceptor.is_listening()),
            _ => None,
        }
    }

    pub fn in_worker(&self, endpoint: &str) -> Option<InWorkerAcceptor> {
        match self.0.borrow().get(endpoint) {
            Some(Registered::InWorker(acceptor)) => acceptor
                .upgrade()
                .filter(|acceptor| !acceptor.is_disposed()),
            _ => None,
        }
    }
}

impl Debug for EndpointRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "EndpointRegistry with {} entries", self.0.borrow().len())
    }
}
