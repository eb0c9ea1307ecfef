use super::*;

/// How a message crosses the worker boundary. Supplied by the host: a closure posting to a
/// worker's queue, a RemoteSender for another thread's event loop, etc. Must preserve order.
pub trait WorkerPort {
    fn post(&self, text: String);
}

impl<F: Fn(String)> WorkerPort for F {
    fn post(&self, text: String) {
        self(text)
    }
}

impl WorkerPort for RemoteSender<String> {
    fn post(&self, text: String) {
        self.send(text).or_log_warn("posting across worker boundary");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkerMessageType {
    InWorkerConnect,
    InWorkerDisconnect,
    InWorkerMessage,
}

/// What travels across the worker boundary, serialized to JSON text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerMessage {
    #[serde(rename = "workerMessageType")]
    pub kind: WorkerMessageType,
    #[serde(rename = "workerEndPoint")]
    pub endpoint: String,
    #[serde(rename = "workerUUID")]
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl WorkerMessage {
    pub fn new(kind: WorkerMessageType, endpoint: &str, uuid: &str, data: Value) -> Self {
        Self {
            kind,
            endpoint: endpoint.to_string(),
            uuid: uuid.to_string(),
            data,
        }
    }

    pub fn encode(&self) -> String {
        json!({
            "workerMessageType": self.kind,
            "workerEndPoint": self.endpoint,
            "workerUUID": self.uuid,
            "data": self.data,
        })
        .to_string()
    }

    pub fn decode(text: &str) -> Result<Self, Box<dyn Error>> {
        serde_json::from_str(text).map_err(|e| format!("bad worker message: {}", e).into())
    }

    pub fn post(self, port: &dyn WorkerPort) {
        port.post(self.encode());
    }
}

/// Transport of the server-side pipe living inside the worker
pub struct InWorkerServerTransport {
    port: Rc<dyn WorkerPort>,
    endpoint: String,
    uuid: String,
}

impl InWorkerServerTransport {
    pub fn new(port: Rc<dyn WorkerPort>, endpoint: &str, uuid: &str) -> Rc<Self> {
        Rc::new(Self {
            port,
            endpoint: endpoint.to_string(),
            uuid: uuid.to_string(),
        })
    }
}

impl Transport for InWorkerServerTransport {
    fn transmit(&self, _: &Pipe, text: String) -> Result<(), Box<dyn Error>> {
        WorkerMessage::new(
            WorkerMessageType::InWorkerMessage,
            &self.endpoint,
            &self.uuid,
            unmarshal(&text),
        )
        .post(&*self.port);
        Ok(())
    }

    fn teardown(&self, _: &Pipe) {
        WorkerMessage::new(
            WorkerMessageType::InWorkerDisconnect,
            &self.endpoint,
            &self.uuid,
            Value::Null,
        )
        .post(&*self.port);
    }
}

#[derive(Default)]
struct WorkerClients {
    awaiting: HashMap<String, WeakPipe>,
    connected: HashMap<String, WeakPipe>,
}

/// Client pipes outside the worker, keyed by their uuid: those still waiting for the worker to
/// accept them and those already connected
#[derive(Clone, Default)]
pub struct WorkerClientRegistry(Rc<RefCell<WorkerClients>>);

impl WorkerClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn awaiting_count(&self) -> usize {
        self.0.borrow().awaiting.len()
    }

    pub fn connected_count(&self) -> usize {
        self.0.borrow().connected.len()
    }

    fn promote(&self, uuid: &str) -> Option<Pipe> {
        let mut clients = self.0.borrow_mut();
        let pipe = clients.awaiting.remove(uuid)?;
        clients.connected.insert(uuid.to_string(), pipe.clone());
        pipe.upgrade()
    }

    fn connected(&self, uuid: &str) -> Option<Pipe> {
        self.0.borrow().connected.get(uuid).and_then(WeakPipe::upgrade)
    }

    /// Returns true if the client had been connected
    fn forget(&self, uuid: &str) -> bool {
        let mut clients = self.0.borrow_mut();
        clients.awaiting.remove(uuid);
        clients.connected.remove(uuid).is_some()
    }
}

struct OutOfWorkerClientTransport {
    port: Rc<dyn WorkerPort>,
    endpoint: String,
    uuid: String,
    clients: WorkerClientRegistry,
}

impl Transport for OutOfWorkerClientTransport {
    fn transmit(&self, _: &Pipe, text: String) -> Result<(), Box<dyn Error>> {
        WorkerMessage::new(
            WorkerMessageType::InWorkerMessage,
            &self.endpoint,
            &self.uuid,
            unmarshal(&text),
        )
        .post(&*self.port);
        Ok(())
    }

    fn teardown(&self, _: &Pipe) {
        if self.clients.forget(&self.uuid) {
            WorkerMessage::new(
                WorkerMessageType::InWorkerDisconnect,
                &self.endpoint,
                &self.uuid,
                Value::Null,
            )
            .post(&*self.port);
        }
    }
}

/// Client side of an in-worker connection, living outside the worker
pub struct OutOfWorkerClientPipe;

impl OutOfWorkerClientPipe {
    /// Asks the worker to accept a new client. The pipe connects (and emits "open") once the
    /// worker answers through out_of_worker_on_message().
    pub fn connect(
        endpoint: &str,
        port: Rc<dyn WorkerPort>,
        clients: &WorkerClientRegistry,
        settings: &PipeSettings,
    ) -> Pipe {
        let uuid = random_uuid();
        let pipe = Pipe::new(
            TransportKind::InWorker,
            PipeSubtype::Client,
            &format!("out_of_worker_client_pipe://{}:{}", endpoint, uuid),
            settings,
            Rc::new(OutOfWorkerClientTransport {
                port: port.clone(),
                endpoint: endpoint.to_string(),
                uuid: uuid.clone(),
                clients: clients.clone(),
            }),
        );
        clients
            .0
            .borrow_mut()
            .awaiting
            .insert(uuid.clone(), pipe.downgrade());
        WorkerMessage::new(WorkerMessageType::InWorkerConnect, endpoint, &uuid, Value::Null)
            .post(&*port);
        pipe
    }
}

/// Feeds a message that came out of the worker to the client pipe it is for. Returns false if
/// the message is malformed or for nobody.
pub fn out_of_worker_on_message(clients: &WorkerClientRegistry, text: &str) -> bool {
    let message = match WorkerMessage::decode(text) {
        Ok(message) => message,
        Err(e) => {
            debug!("{}", e);
            return false;
        }
    };
    match message.kind {
        WorkerMessageType::InWorkerConnect => match clients.promote(&message.uuid) {
            Some(pipe) => {
                if pipe.mark_connected() {
                    pipe.emit_open();
                }
                true
            }
            None => false,
        },
        WorkerMessageType::InWorkerDisconnect => match clients.connected(&message.uuid) {
            Some(pipe) => {
                pipe.disconnect();
                true
            }
            None => false,
        },
        WorkerMessageType::InWorkerMessage => match clients.connected(&message.uuid) {
            Some(pipe) => {
                pipe.receive(Payload::Json(message.data));
                true
            }
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_message_wire_format() {
        let message = WorkerMessage::new(
            WorkerMessageType::InWorkerMessage,
            "ep",
            "u-1",
            json!({"id": "a"}),
        );
        let value: Value = serde_json::from_str(&message.encode()).unwrap();
        assert_eq!(
            value,
            json!({
                "workerMessageType": "inWorkerMessage",
                "workerEndPoint": "ep",
                "workerUUID": "u-1",
                "data": {"id": "a"},
            })
        );
        assert_eq!(WorkerMessage::decode(&message.encode()).unwrap(), message);
    }

    #[test]
    fn decode_accepts_missing_data() {
        let message = WorkerMessage::decode(
            r#"{"workerMessageType":"inWorkerConnect","workerEndPoint":"e","workerUUID":"u"}"#,
        )
        .unwrap();
        assert_eq!(message.kind, WorkerMessageType::InWorkerConnect);
        assert!(message.data.is_null());
    }

    #[test]
    fn connect_posts_connect_request_and_waits() {
        let posted = Rc::new(RefCell::new(Vec::new()));
        let posted_clone = posted.clone();
        let clients = WorkerClientRegistry::new();
        let pipe = OutOfWorkerClientPipe::connect(
            "ep",
            Rc::new(move |text: String| posted_clone.borrow_mut().push(text)),
            &clients,
            &PipeSettings::default(),
        );
        assert!(!pipe.is_connected());
        assert_eq!(clients.awaiting_count(), 1);
        let request = WorkerMessage::decode(&posted.borrow()[0]).unwrap();
        assert_eq!(request.kind, WorkerMessageType::InWorkerConnect);
        assert!(pipe.url().ends_with(&request.uuid));
    }

    #[test]
    fn unknown_or_garbage_messages_are_not_consumed() {
        let clients = WorkerClientRegistry::new();
        assert!(!out_of_worker_on_message(&clients, "garbage"));
        let stray = WorkerMessage::new(WorkerMessageType::InWorkerMessage, "e", "nobody", json!(1));
        assert!(!out_of_worker_on_message(&clients, &stray.encode()));
    }

    #[test]
    fn dispose_while_awaiting_forgets_client_without_posting() {
        let posted = Rc::new(Cell::new(0));
        let posted_clone = posted.clone();
        let clients = WorkerClientRegistry::new();
        let pipe = OutOfWorkerClientPipe::connect(
            "ep",
            Rc::new(move |_: String| posted_clone.set(posted_clone.get() + 1)),
            &clients,
            &PipeSettings::default(),
        );
        pipe.dispose();
        assert_eq!(clients.awaiting_count(), 0);
        assert_eq!(posted.get(), 1);
    }
}
