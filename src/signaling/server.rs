use super::*;

type SignalingHandler =
    fn(&ServerImpl, &Value, Envelope, &Pipe) -> Result<Option<Envelope>, SignalingError>;

/// Per accepted pipe
struct Session {
    pipe: WeakPipe,
    remote_address: String,
    client: Option<SignalingClient>,
    auth: SignalingAuthInfo,
    listeners: Vec<(&'static str, Listener)>,
}

struct ServerImpl {
    me: Weak<ServerImpl>,
    acceptor: Acceptor,
    manager: SignalingManager,
    discovery: DiscoverySettings,
    rpc: RpcServer,
    /// Keyed by Pipe::id()
    sessions: RefCell<HashMap<usize, Session>>,
    on_connection: RefCell<Option<Listener>>,
    events: EventDispatcher,
}

/// Answers the signaling methods on every pipe its acceptor hands out, binding each pipe to a
/// client in the manager's namespace. Only emits "dispose".
#[derive(Clone)]
pub struct SignalingServer(Rc<ServerImpl>);

fn non_empty_str<'a>(message: &'a Value, key: &str) -> Option<&'a str> {
    message
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

impl SignalingServer {
    pub fn new(
        acceptor: &Acceptor,
        manager: &SignalingManager,
        discovery: &DiscoverySettings,
    ) -> Self {
        let inner = Rc::new_cyclic(|me| ServerImpl {
            me: me.clone(),
            acceptor: acceptor.clone(),
            manager: manager.clone(),
            discovery: discovery.clone(),
            rpc: RpcServer::new(acceptor),
            sessions: RefCell::new(HashMap::new()),
            on_connection: RefCell::new(None),
            events: EventDispatcher::new(),
        });
        let weak = Rc::downgrade(&inner);
        let on_connection = acceptor.listen("connection", move |event| {
            if let (Some(server), Some(pipe)) = (weak.upgrade(), event.get::<Pipe>()) {
                let remote_address = event
                    .str_field("remoteAddress")
                    .map(str::to_string)
                    .unwrap_or_else(|| pipe.remote_address());
                server.start_session(pipe, &remote_address);
            }
        });
        *inner.on_connection.borrow_mut() = Some(on_connection);
        inner.register("signalingImpersonate", ServerImpl::impersonate);
        inner.register("signalingPublishOffer", ServerImpl::publish_offer);
        inner.register("signalingFetchOffer", ServerImpl::fetch_offer);
        inner.register("signalingPublishAnswer", ServerImpl::publish_answer);
        inner.register("signalingListSpaces", ServerImpl::list_spaces);
        info!("signaling server running on {:?}", acceptor);
        Self(inner)
    }

    pub fn manager(&self) -> &SignalingManager {
        &self.0.manager
    }

    pub fn session_count(&self) -> usize {
        self.0.sessions.borrow().len()
    }

    /// The client a pipe impersonated as, if it did
    pub fn client_of(&self, pipe: &Pipe) -> Option<SignalingClient> {
        self.0.client_of(pipe)
    }

    /// Stops answering and disposes every client it bound. The acceptor and the manager stay
    /// up.
    pub fn dispose(&self) {
        if self.0.events.is_disposed() {
            return;
        }
        if let Some(on_connection) = self.0.on_connection.borrow_mut().take() {
            self.0.acceptor.off("connection", Some(&on_connection));
        }
        self.0.rpc.dispose();
        let ids: Vec<usize> = self.0.sessions.borrow().keys().cloned().collect();
        for id in ids {
            self.0.end_session(id);
        }
        info!("signaling server stopped");
        self.0.events.dispose();
    }
}

impl ServerImpl {
    fn register(&self, method: &'static str, handler: SignalingHandler) {
        let me = self.me.clone();
        self.rpc.register(method, move |message, answer, pipe| {
            let server = match me.upgrade() {
                Some(server) => server,
                None => return Ok(None),
            };
            let result = handler(&server, message, answer, pipe);
            server.auto_dispose_namespace(pipe);
            match result {
                Ok(answer) => Ok(answer),
                Err(e) if e.is_force_disconnect() => {
                    warn!("{} failed {}: {}", pipe.describe(), method, e);
                    let mut answer = prepare_answer(message);
                    answer.insert("error".to_string(), json!(e.to_string()));
                    pipe.send(answer).or_log_warn("answering signaling call");
                    pipe.disconnect();
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            }
        });
    }

    fn start_session(&self, pipe: &Pipe, remote_address: &str) {
        debug!("new signaling server connection {:?}", remote_address);
        let id = pipe.id();
        let end = |kind: &'static str| {
            let me = self.me.clone();
            listener(move |event| {
                if let Some(server) = me.upgrade() {
                    if kind == "error" {
                        warn!("signaling pipe error: {:?}", event.str_field("message"));
                    }
                    server.end_session(id);
                }
            })
        };
        let listeners = vec![("close", end("close")), ("error", end("error"))];
        for (kind, listener) in &listeners {
            pipe.on(kind, listener);
        }
        self.sessions.borrow_mut().insert(
            id,
            Session {
                pipe: pipe.downgrade(),
                remote_address: remote_address.to_string(),
                client: None,
                auth: SignalingAuthInfo::default(),
                listeners,
            },
        );
    }

    /// Detaches from the pipe and disposes its client, which leaves its space
    fn end_session(&self, id: usize) {
        let session = self.sessions.borrow_mut().remove(&id);
        let session = match session {
            Some(session) => session,
            None => return,
        };
        debug!("signaling connection {:?} closed", session.remote_address);
        if let Some(pipe) = session.pipe.upgrade() {
            for (kind, listener) in &session.listeners {
                pipe.off(kind, Some(listener));
            }
        }
        if let Some(client) = session.client {
            client.dispose();
        }
    }

    fn client_of(&self, pipe: &Pipe) -> Option<SignalingClient> {
        self.sessions
            .borrow()
            .get(&pipe.id())
            .and_then(|session| session.client.clone())
    }

    fn auto_dispose_namespace(&self, pipe: &Pipe) {
        if let Some(space) = self.client_of(pipe).and_then(|client| client.space()) {
            space.auto_dispose();
            if let Some(category) = space.category() {
                category.auto_dispose();
            }
        }
    }

    fn impersonate(
        &self,
        message: &Value,
        mut answer: Envelope,
        pipe: &Pipe,
    ) -> Result<Option<Envelope>, SignalingError> {
        if let Some(client) = self.client_of(pipe) {
            return Err(SignalingError::AlreadyImpersonated(client.id().to_string()));
        }
        let id_rtc_participant =
            non_empty_str(message, "idRtcParticipant").ok_or(SignalingError::MissingParticipant)?;
        let role = non_empty_str(message, "role")
            .and_then(Role::parse)
            .ok_or(SignalingError::BadRole)?;
        let id_category =
            non_empty_str(message, "idCategory").ok_or(SignalingError::MissingCategory)?;
        let category = self
            .manager
            .category_get(id_category, true)
            .ok_or_else(|| SignalingError::NoCategory(id_category.to_string()))?;
        let result = self.impersonate_in(&category, id_rtc_participant, role, message, pipe);
        category.auto_dispose();
        let auth = result?;
        answer.insert(
            "signalingAuthInfo".to_string(),
            serde_json::to_value(&auth).unwrap_or(Value::Null),
        );
        Ok(Some(answer))
    }

    fn impersonate_in(
        &self,
        category: &SignalingCategory,
        id_rtc_participant: &str,
        role: Role,
        message: &Value,
        pipe: &Pipe,
    ) -> Result<SignalingAuthInfo, SignalingError> {
        let id_space = non_empty_str(message, "idSpace").ok_or(SignalingError::MissingSpace)?;
        let space = category
            .space_get(id_space, true)
            .ok_or_else(|| SignalingError::NoSpace(id_space.to_string()))?;
        let result = self.join_space(&space, id_rtc_participant, role, pipe);
        space.auto_dispose();
        result
    }

    fn join_space(
        &self,
        space: &SignalingSpace,
        id_rtc_participant: &str,
        role: Role,
        pipe: &Pipe,
    ) -> Result<SignalingAuthInfo, SignalingError> {
        if space.client_get(id_rtc_participant).is_some() {
            return Err(SignalingError::DuplicateParticipant {
                id_rtc_participant: id_rtc_participant.to_string(),
                id_space: space.id().to_string(),
            });
        }
        let creator = space.creator_id();
        if role == Role::Creator && !creator.is_empty() && creator != id_rtc_participant {
            return Err(SignalingError::CreatorConflict {
                id_rtc_participant: id_rtc_participant.to_string(),
                id_space: space.id().to_string(),
            });
        }
        let client = SignalingClient::new(
            id_rtc_participant,
            role,
            space,
            pipe,
            self.acceptor.event_loop(),
            &self.discovery,
        );
        let auth = SignalingAuthInfo {
            is_authorized: true,
            id_category: Some(space.id_category().to_string()),
            id_space_space: Some(space.id().to_string()),
            id_rtc_participant: Some(id_rtc_participant.to_string()),
        };
        let mut sessions = self.sessions.borrow_mut();
        match sessions.get_mut(&pipe.id()) {
            Some(session) => {
                info!(
                    "signaling connection {:?} impersonated as {} {:?} in {:?}/{:?}",
                    session.remote_address,
                    role,
                    id_rtc_participant,
                    space.id_category(),
                    space.id()
                );
                session.client = Some(client);
                session.auth = auth.clone();
            }
            None => {
                drop(sessions);
                warn!("impersonation on an unknown signaling pipe {}", pipe.describe());
                client.dispose();
            }
        }
        Ok(auth)
    }

    fn publish_offer(
        &self,
        message: &Value,
        answer: Envelope,
        pipe: &Pipe,
    ) -> Result<Option<Envelope>, SignalingError> {
        let not_impersonated = SignalingError::NotImpersonated("publish offers");
        let client = self.client_of(pipe).ok_or_else(|| not_impersonated.clone())?;
        if client.role() != Role::Creator {
            return Err(SignalingError::NotCreator);
        }
        let space = client.space().ok_or(not_impersonated)?;
        let id_offer = message.get("idOffer").and_then(Value::as_u64).unwrap_or(0);
        space.publish_offer(
            message.get("offer").cloned().unwrap_or(Value::Null),
            id_offer,
        );
        debug!(
            "{:?} published offer {} in {:?}",
            client.id(),
            id_offer,
            space.id()
        );
        Ok(Some(answer))
    }

    /// Answered by the client once discovery ends
    fn fetch_offer(
        &self,
        message: &Value,
        _answer: Envelope,
        pipe: &Pipe,
    ) -> Result<Option<Envelope>, SignalingError> {
        let client = self
            .client_of(pipe)
            .ok_or(SignalingError::NotImpersonated("fetch published offers"))?;
        client.offer_discovery_start(message);
        Ok(None)
    }

    /// Forwards the answer to the creator it names, stamped with the joiner's id. The joiner
    /// gets no reply on success.
    fn publish_answer(
        &self,
        message: &Value,
        _answer: Envelope,
        pipe: &Pipe,
    ) -> Result<Option<Envelope>, SignalingError> {
        let not_impersonated = SignalingError::NotImpersonated("publish offer answers");
        let client = self.client_of(pipe).ok_or_else(|| not_impersonated.clone())?;
        let space = client.space().ok_or(not_impersonated)?;
        let id_creator = message
            .get("idSomebodyCreator")
            .and_then(Value::as_str)
            .unwrap_or("");
        let creator = space
            .client_get(id_creator)
            .ok_or_else(|| SignalingError::UnknownCreator(id_creator.to_string()))?;
        let mut forward = message.as_object().cloned().unwrap_or_default();
        forward.insert("idSomebody_joiner".to_string(), json!(client.id()));
        creator
            .send(forward)
            .or_log_warn("forwarding answer to creator");
        Ok(None)
    }

    /// Diagnostics, lists the spaces of one category or of all of them
    fn list_spaces(
        &self,
        message: &Value,
        mut answer: Envelope,
        _pipe: &Pipe,
    ) -> Result<Option<Envelope>, SignalingError> {
        let categories: Vec<SignalingCategory> = match non_empty_str(message, "idCategory") {
            Some(id_category) => self.manager.category_get(id_category, false).into_iter().collect(),
            None => self
                .manager
                .category_ids()
                .iter()
                .filter_map(|id| self.manager.category_get(id, false))
                .collect(),
        };
        let spaces: Vec<Value> = categories
            .iter()
            .flat_map(|category| {
                category
                    .space_ids()
                    .into_iter()
                    .filter_map(move |id| category.space_get(&id, false))
            })
            .map(|space| {
                json!({
                    "idCategory": space.id_category(),
                    "idSpace": space.id(),
                    "idSomebodyCreator": space.creator_id(),
                    "clientCount": space.client_ids().len(),
                    "offerCount": space.pending_offer_count(),
                })
            })
            .collect();
        answer.insert("arrSpaces".to_string(), Value::Array(spaces));
        Ok(Some(answer))
    }
}

impl EventSource for SignalingServer {
    fn dispatcher(&self) -> &EventDispatcher {
        &self.0.events
    }
}

impl Debug for SignalingServer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SignalingServer on {:?} ({} sessions)",
            self.0.acceptor,
            self.session_count()
        )
    }
}
