use super::*;
use std::ops::Deref;

struct InWorkerAcceptorImpl {
    acceptor: Acceptor,
    port: Rc<dyn WorkerPort>,
}

/// Acceptor living inside a worker. Clients outside connect with OutOfWorkerClientPipe; their
/// messages reach it through in_worker_on_message() and answers leave through the port.
#[derive(Clone)]
pub struct InWorkerAcceptor(Rc<InWorkerAcceptorImpl>);

#[derive(Clone)]
pub struct WeakInWorkerAcceptor(Weak<InWorkerAcceptorImpl>);

impl WeakInWorkerAcceptor {
    pub fn upgrade(&self) -> Option<InWorkerAcceptor> {
        self.0.upgrade().map(InWorkerAcceptor)
    }
}

impl InWorkerAcceptor {
    pub fn new(
        endpoint: &str,
        registry: &EndpointRegistry,
        port: Rc<dyn WorkerPort>,
        event_loop: &EventLoop,
        settings: &PipeSettings,
    ) -> Result<Self, Box<dyn Error>> {
        let acceptor = Acceptor::new(AcceptorKind::InWorker, endpoint, event_loop, settings);
        let result = Self(Rc::new(InWorkerAcceptorImpl { acceptor, port }));
        registry.register_in_worker(endpoint, &result)?;
        let registry = registry.clone();
        let key = endpoint.to_string();
        let id = result.id();
        result
            .acceptor()
            .on_teardown(move || registry.unregister(&key, id));
        result.acceptor().announce_open();
        Ok(result)
    }

    pub fn acceptor(&self) -> &Acceptor {
        &self.0.acceptor
    }

    pub fn downgrade(&self) -> WeakInWorkerAcceptor {
        WeakInWorkerAcceptor(Rc::downgrade(&self.0))
    }

    pub(crate) fn id(&self) -> usize {
        self.0.acceptor.id()
    }

    fn accept(&self, uuid: &str) {
        if !self.is_listening() {
            return;
        }
        let endpoint = self.endpoint().to_string();
        let pipe = Pipe::new(
            TransportKind::InWorker,
            PipeSubtype::Server,
            &format!("in_worker_server_pipe://{}:{}", endpoint, uuid),
            self.settings(),
            InWorkerServerTransport::new(self.0.port.clone(), &endpoint, uuid),
        );
        pipe.set_remote_address(&format!("out_of_worker_client_pipe://{}:{}", endpoint, uuid));
        pipe.mark_connected();
        self.register_client(uuid, AcceptorEntry::Single(pipe.clone()));
        WorkerMessage::new(WorkerMessageType::InWorkerConnect, &endpoint, uuid, Value::Null)
            .post(&*self.0.port);
        self.announce_connection(&pipe);
    }
}

impl Deref for InWorkerAcceptor {
    type Target = Acceptor;

    fn deref(&self) -> &Self::Target {
        &self.0.acceptor
    }
}

/// Feeds a message that came into the worker to the acceptor (connect) or server pipe
/// (disconnect, message) it is for. Returns false if the message is malformed or for nobody.
pub fn in_worker_on_message(registry: &EndpointRegistry, text: &str) -> bool {
    let message = match WorkerMessage::decode(text) {
        Ok(message) => message,
        Err(e) => {
            debug!("{}", e);
            return false;
        }
    };
    let acceptor = match registry.in_worker(&message.endpoint) {
        Some(acceptor) => acceptor,
        None => return false,
    };
    match message.kind {
        WorkerMessageType::InWorkerConnect => {
            acceptor.accept(&message.uuid);
            true
        }
        WorkerMessageType::InWorkerDisconnect => match acceptor.server_pipe(&message.uuid) {
            Some(pipe) => {
                pipe.disconnect();
                true
            }
            None => false,
        },
        WorkerMessageType::InWorkerMessage => match acceptor.server_pipe(&message.uuid) {
            Some(pipe) => {
                pipe.receive(Payload::Json(message.data));
                true
            }
            None => false,
        },
    }
}
