use super::*;

/// Gets the request, an answer prepared from it (same id and method, null error) and the pipe
/// it came on. Returns the answer to send, or None to send nothing. An Err is sent back as
/// the answer's "error".
pub type RpcHandler = Rc<dyn Fn(&Value, Envelope, &Pipe) -> Result<Option<Envelope>, Box<dyn Error>>>;

struct Accepted {
    pipe: WeakPipe,
    listeners: Vec<(&'static str, Listener)>,
}

struct RpcServerImpl {
    acceptor: Acceptor,
    handlers: RefCell<HashMap<String, RpcHandler>>,
    /// Keyed by Pipe::id()
    accepted: RefCell<HashMap<usize, Accepted>>,
    on_connection: RefCell<Option<Listener>>,
}

#[derive(Clone)]
pub struct RpcServer(Rc<RpcServerImpl>);

impl RpcServer {
    pub fn new(acceptor: &Acceptor) -> Self {
        let server = Self(Rc::new(RpcServerImpl {
            acceptor: acceptor.clone(),
            handlers: RefCell::new(HashMap::new()),
            accepted: RefCell::new(HashMap::new()),
            on_connection: RefCell::new(None),
        }));
        let weak = Rc::downgrade(&server.0);
        let on_connection = acceptor.listen("connection", move |event| {
            if let (Some(server), Some(pipe)) = (weak.upgrade(), event.get::<Pipe>()) {
                RpcServer(server).accept(pipe);
            }
        });
        *server.0.on_connection.borrow_mut() = Some(on_connection);
        server
    }

    /// Replaces any handler already registered for the method
    pub fn register<F>(&self, method: &str, handler: F)
    where
        F: Fn(&Value, Envelope, &Pipe) -> Result<Option<Envelope>, Box<dyn Error>> + 'static,
    {
        self.register_rc(method, Rc::new(handler));
    }

    pub fn register_rc(&self, method: &str, handler: RpcHandler) {
        self.0
            .handlers
            .borrow_mut()
            .insert(method.to_string(), handler);
    }

    pub fn accepted_count(&self) -> usize {
        self.0.accepted.borrow().len()
    }

    fn accept(&self, pipe: &Pipe) {
        trace!("RPC server accepted {}", pipe.describe());
        let id = pipe.id();
        let forget = move |server: &Weak<RpcServerImpl>| {
            if let Some(server) = server.upgrade() {
                RpcServer(server).forget(id);
            }
        };
        let on_message = {
            let server = Rc::downgrade(&self.0);
            listener(move |event| {
                let server = match server.upgrade() {
                    Some(server) => RpcServer(server),
                    None => return,
                };
                if let (Some(message), Some(pipe)) = (event.field("message"), event.get::<Pipe>()) {
                    server.handle_message(message, pipe);
                }
            })
        };
        let on_close = {
            let server = Rc::downgrade(&self.0);
            listener(move |_| forget(&server))
        };
        let on_error = {
            let server = Rc::downgrade(&self.0);
            listener(move |event| {
                debug!("RPC pipe error: {:?}", event.str_field("message"));
                forget(&server);
            })
        };
        let listeners = vec![("message", on_message), ("close", on_close), ("error", on_error)];
        for (kind, listener) in &listeners {
            pipe.on(kind, listener);
        }
        self.0.accepted.borrow_mut().insert(
            id,
            Accepted {
                pipe: pipe.downgrade(),
                listeners,
            },
        );
    }

    fn forget(&self, id: usize) {
        let accepted = self.0.accepted.borrow_mut().remove(&id);
        if let Some(accepted) = accepted {
            if let Some(pipe) = accepted.pipe.upgrade() {
                for (kind, listener) in &accepted.listeners {
                    pipe.off(kind, Some(listener));
                }
            }
        }
    }

    /// Answers one request. A missing or throwing handler never affects the pipe itself.
    pub fn handle_message(&self, message: &Value, pipe: &Pipe) {
        let method = message.get("method").and_then(Value::as_str).unwrap_or("");
        let handler = self.0.handlers.borrow().get(method).cloned();
        let answer = match handler {
            Some(handler) => match handler(message, prepare_answer(message), pipe) {
                Ok(answer) => answer,
                Err(e) => {
                    warn!("RPC method {:?} failed: {}", method, e);
                    let mut answer = prepare_answer(message);
                    answer.insert("error".to_string(), Value::String(e.to_string()));
                    Some(answer)
                }
            },
            None => {
                debug!("{} sent unhandled message {}", pipe.describe(), message);
                let mut answer = prepare_answer(message);
                answer.insert(
                    "error".to_string(),
                    Value::String("Unhandled message".to_string()),
                );
                answer.insert("joMessage".to_string(), message.clone());
                Some(answer)
            }
        };
        if let Some(answer) = answer {
            pipe.send(answer).or_log_warn("sending RPC answer");
        }
    }

    /// Stops accepting and lets go of every accepted pipe (without closing them)
    pub fn dispose(&self) {
        if let Some(on_connection) = self.0.on_connection.borrow_mut().take() {
            self.0.acceptor.off("connection", Some(&on_connection));
        }
        let ids: Vec<usize> = self.0.accepted.borrow().keys().cloned().collect();
        for id in ids {
            self.forget(id);
        }
        self.0.handlers.borrow_mut().clear();
    }
}

impl Debug for RpcServer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut methods: Vec<String> = self.0.handlers.borrow().keys().cloned().collect();
        methods.sort();
        write!(f, "RpcServer on {:?} handling {:?}", self.0.acceptor, methods)
    }
}

/// Answers with the request's "message", or a placeholder if it has none
pub fn echo_handler() -> RpcHandler {
    Rc::new(|message, mut answer, _pipe| {
        let echo = match message.get("message") {
            Some(echo) if !echo.is_null() => echo.clone(),
            _ => Value::String("<no message echo>".to_string()),
        };
        answer.insert("message".to_string(), echo);
        Ok(Some(answer))
    })
}
