use super::*;

struct ClientImpl {
    me: Weak<ClientImpl>,
    id: String,
    role: Role,
    space: WeakSignalingSpace,
    id_space: String,
    id_category: String,
    pipe: RefCell<Option<Pipe>>,
    event_loop: EventLoop,
    discovery: DiscoverySettings,
    /// The signalingFetchOffer request being answered, while discovery runs
    fetch_request: RefCell<Option<Value>>,
    discovery_step: Cell<u32>,
    discovery_timer: Cell<Option<TimerKey>>,
    events: EventDispatcher,
    disposed: Cell<bool>,
}

/// A signaling pipe after impersonation: a participant with a role inside one space. Only
/// emits "dispose".
#[derive(Clone)]
pub struct SignalingClient(Rc<ClientImpl>);

impl SignalingClient {
    /// Joins the space, and becomes its creator if the role says so
    pub(crate) fn new(
        id_rtc_participant: &str,
        role: Role,
        space: &SignalingSpace,
        pipe: &Pipe,
        event_loop: &EventLoop,
        discovery: &DiscoverySettings,
    ) -> Self {
        let client = Self(Rc::new_cyclic(|me| ClientImpl {
            me: me.clone(),
            id: id_rtc_participant.to_string(),
            role,
            space: space.downgrade(),
            id_space: space.id().to_string(),
            id_category: space.id_category().to_string(),
            pipe: RefCell::new(Some(pipe.clone())),
            event_loop: event_loop.clone(),
            discovery: discovery.clone(),
            fetch_request: RefCell::new(None),
            discovery_step: Cell::new(0),
            discovery_timer: Cell::new(None),
            events: EventDispatcher::new(),
            disposed: Cell::new(false),
        }));
        space.add_client(&client);
        debug!(
            "new signaling {} {:?} in space {:?} of category {:?} using {}",
            role,
            id_rtc_participant,
            space.id(),
            space.id_category(),
            pipe.remote_address()
        );
        client
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn role(&self) -> Role {
        self.0.role
    }

    pub fn id_space(&self) -> &str {
        &self.0.id_space
    }

    pub fn id_category(&self) -> &str {
        &self.0.id_category
    }

    pub fn space(&self) -> Option<SignalingSpace> {
        self.0.space.upgrade()
    }

    /// None once disconnected
    pub fn pipe(&self) -> Option<Pipe> {
        self.0.pipe.borrow().clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.0.disposed.get()
    }

    pub fn ptr_eq(&self, other: &SignalingClient) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_fetching_offer(&self) -> bool {
        self.0.fetch_request.borrow().is_some()
    }

    /// Number of discovery steps taken by the running discovery
    pub fn discovery_step(&self) -> u32 {
        self.0.discovery_step.get()
    }

    pub fn send<P: Into<Payload>>(&self, data: P) -> Result<(), Box<dyn Error>> {
        match self.pipe() {
            Some(pipe) => pipe.send(data),
            None => Err(format!("signaling client {:?} is disconnected", self.0.id).into()),
        }
    }

    /// Looks for an offer right away, then every discovery period until one shows up or the
    /// step budget runs out. Either way the request gets exactly one answer. Does nothing if a
    /// discovery is already running.
    pub fn offer_discovery_start(&self, request: &Value) {
        if self.is_disposed() || self.is_fetching_offer() {
            return;
        }
        *self.0.fetch_request.borrow_mut() = Some(request.clone());
        self.offer_discovery_step();
    }

    pub fn offer_discovery_stop(&self) {
        if let Some(key) = self.0.discovery_timer.take() {
            self.0.event_loop.cancel(key);
        }
        self.0.fetch_request.borrow_mut().take();
        self.0.discovery_step.set(0);
    }

    fn offer_discovery_step(&self) {
        let request = match self.0.fetch_request.borrow().clone() {
            Some(request) => request,
            None => return,
        };
        let step = self.0.discovery_step.get() + 1;
        self.0.discovery_step.set(step);
        let record = self.space().and_then(|space| space.fetch_published_offer());
        let mut answer = prepare_answer(&request);
        match record {
            Some(record) => {
                debug!(
                    "signaling client {:?} fetched offer {} of {:?}",
                    self.0.id, record.id_offer, record.id_somebody_creator
                );
                answer.insert("offer".to_string(), record.offer);
                answer.insert("idOffer".to_string(), json!(record.id_offer));
                answer.insert(
                    "idSomebodyCreator".to_string(),
                    json!(record.id_somebody_creator),
                );
            }
            None if step >= self.0.discovery.step_count => {
                warn!(
                    "signaling client {:?} found no offer in {} steps",
                    self.0.id, step
                );
                answer.insert(
                    "error".to_string(),
                    json!(SignalingError::NoOfferFound.to_string()),
                );
            }
            None => {
                trace!(
                    "signaling client {:?} found no offer at step {} of {}",
                    self.0.id,
                    step,
                    self.0.discovery.step_count
                );
                let me = self.0.me.clone();
                let key = self.0.event_loop.schedule(self.0.discovery.period, move || {
                    if let Some(inner) = me.upgrade() {
                        inner.discovery_timer.set(None);
                        SignalingClient(inner).offer_discovery_step();
                    }
                });
                self.0.discovery_timer.set(Some(key));
                return;
            }
        }
        self.offer_discovery_stop();
        self.send(answer).or_log_warn("answering signalingFetchOffer");
    }

    /// Stops discovery and closes the signaling pipe
    pub fn disconnect(&self) {
        self.offer_discovery_stop();
        let pipe = self.0.pipe.borrow_mut().take();
        if let Some(pipe) = pipe {
            debug!("disconnecting signaling client {:?}", self.0.id);
            pipe.disconnect();
        }
    }

    /// Leaves the space, which disposes itself if this was its last client
    pub fn dispose(&self) {
        if self.0.disposed.replace(true) {
            return;
        }
        debug!(
            "disposing signaling client {:?} in space {:?} of category {:?}",
            self.0.id, self.0.id_space, self.0.id_category
        );
        self.disconnect();
        if let Some(space) = self.space() {
            space.forget_client(self);
            space.auto_dispose();
        }
        self.0.events.dispose();
    }
}

impl EventSource for SignalingClient {
    fn dispatcher(&self) -> &EventDispatcher {
        &self.0.events
    }
}

impl Debug for SignalingClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SignalingClient {:?} ({}) in {:?}/{:?}",
            self.0.id, self.0.role, self.0.id_category, self.0.id_space
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Setup {
        event_loop: EventLoop,
        space: SignalingSpace,
        joiner: SignalingClient,
        answers: RecordedEvents,
        _manager: SignalingManager,
        _creator: SignalingClient,
        _joiner_remote: Pipe,
    }

    fn setup(step_count: u32) -> Setup {
        let event_loop = EventLoop::new_manual();
        let manager = SignalingManager::default();
        let space = manager
            .category_get("games", true)
            .unwrap()
            .space_get("lobby", true)
            .unwrap();
        let discovery = DiscoverySettings {
            period: Duration::from_millis(100),
            step_count,
        };
        let (creator_server, _) = direct_pair(&PipeSettings::default(), None);
        let creator = SignalingClient::new(
            "creator-1",
            Role::Creator,
            &space,
            &creator_server,
            &event_loop,
            &discovery,
        );
        let (joiner_server, joiner_remote) = direct_pair(&PipeSettings::default(), None);
        let joiner = SignalingClient::new(
            "joiner-1",
            Role::Joiner,
            &space,
            &joiner_server,
            &event_loop,
            &discovery,
        );
        let answers = RecordedEvents::new(&joiner_remote, &["message"]);
        Setup {
            event_loop,
            space,
            joiner,
            answers,
            _manager: manager,
            _creator: creator,
            _joiner_remote: joiner_remote,
        }
    }

    fn fetch_request() -> Value {
        json!({"id": "f1", "method": "signalingFetchOffer"})
    }

    #[test]
    fn offer_already_published_is_answered_at_once() {
        let s = setup(3);
        s.space.publish_offer(json!({"sdp": "A"}), 1);
        s.joiner.offer_discovery_start(&fetch_request());
        assert_eq!(
            s.answers.fields("message"),
            vec![json!({
                "id": "f1",
                "method": "signalingFetchOffer",
                "error": null,
                "offer": {"sdp": "A"},
                "idOffer": 1,
                "idSomebodyCreator": "creator-1",
            })]
        );
        assert!(!s.joiner.is_fetching_offer());
        assert_eq!(s.event_loop.pending_count(), 0);
    }

    #[test]
    fn offer_published_later_is_found_on_a_later_step() {
        let s = setup(3);
        s.joiner.offer_discovery_start(&fetch_request());
        assert!(s.joiner.is_fetching_offer());
        s.space.publish_offer(json!({"sdp": "A"}), 4);
        s.event_loop.advance(Duration::from_millis(100));
        assert_eq!(s.answers.len(), 1);
        assert_eq!(s.answers.field(0, "message")["idOffer"], json!(4));
    }

    #[test]
    fn gives_up_after_exactly_the_step_budget() {
        let s = setup(3);
        s.joiner.offer_discovery_start(&fetch_request());
        assert_eq!(s.joiner.discovery_step(), 1);
        s.event_loop.advance(Duration::from_millis(100));
        assert_eq!(s.joiner.discovery_step(), 2);
        assert_eq!(s.answers.len(), 0);
        s.event_loop.advance(Duration::from_millis(100));
        assert_eq!(s.answers.len(), 1);
        assert_eq!(s.answers.field(0, "message")["error"], json!("no offer found"));
        assert!(!s.joiner.is_fetching_offer());
        s.event_loop.advance(Duration::from_millis(1000));
        assert_eq!(s.answers.len(), 1);
    }

    #[test]
    fn second_start_while_fetching_is_ignored() {
        let s = setup(2);
        s.joiner.offer_discovery_start(&fetch_request());
        s.joiner
            .offer_discovery_start(&json!({"id": "f2", "method": "signalingFetchOffer"}));
        s.event_loop.advance(Duration::from_millis(100));
        assert_eq!(s.answers.len(), 1);
        assert_eq!(s.answers.field(0, "message")["id"], json!("f1"));
    }

    #[test]
    fn dispose_stops_discovery() {
        let s = setup(3);
        s.joiner.offer_discovery_start(&fetch_request());
        s.joiner.dispose();
        assert_eq!(s.event_loop.pending_count(), 0);
        s.event_loop.advance(Duration::from_millis(1000));
        assert_eq!(s.answers.len(), 0);
        assert!(s.joiner.pipe().is_none());
        assert!(s.joiner.send(json!({})).is_err());
    }
}
