use super::*;

pub(crate) struct JoinerImpl {
    me: Weak<JoinerImpl>,
    core: ActorCore,
    id_offer: Cell<Option<u64>>,
    id_somebody_creator: RefCell<Option<String>>,
    answer_published: Cell<bool>,
}

/// Fetches one offer from the signaling server, answers it and waits for the creator's data
/// channel.
///
/// Events: "signalingPipeOpen", "signalingPipeClose", "signalingPipeError", "signalingClosed",
/// "signalingPassedImpersonation", "signalingFailedImpersonation", "signalingPassedFetchOffer"
/// (fields "idSomebodyOtherSide" and "idOffer"), "signalingFailedFetchOffer",
/// "remoteDescriptionSet", "answerCreated", "localDescriptionSet", "identified",
/// "dataChannelAvailable" (field "label"), the data channel events, "peerClose",
/// "rtcParticipantError" and "dispose".
#[derive(Clone)]
pub struct RtcJoiner(Rc<JoinerImpl>);

impl RtcJoiner {
    pub fn new(context: &RtcContext, config: &ActorConfig) -> Result<Self, Box<dyn Error>> {
        let inner = Rc::new_cyclic(|me| JoinerImpl {
            me: me.clone(),
            core: ActorCore::new(Role::Joiner, context, config),
            id_offer: Cell::new(None),
            id_somebody_creator: RefCell::new(None),
            answer_published: Cell::new(false),
        });
        open_signaling(&inner)?;
        Ok(Self(inner))
    }

    pub fn id(&self) -> String {
        self.0.participant_id()
    }

    pub fn describe(&self) -> String {
        self.0.describe()
    }

    pub fn is_impersonated(&self) -> bool {
        self.0.core.was_impersonated.get()
    }

    pub fn is_identified(&self) -> bool {
        self.0.core.link.borrow().was_identified
    }

    pub fn is_disposed(&self) -> bool {
        self.0.is_disposed()
    }

    /// The offer this joiner answered
    pub fn id_offer(&self) -> Option<u64> {
        self.0.id_offer.get()
    }

    /// The creator that published the offer
    pub fn other_side(&self) -> Option<String> {
        self.0.id_somebody_creator.borrow().clone()
    }

    pub fn signaling_pipe(&self) -> Option<Pipe> {
        self.0.core.signaling_pipe()
    }

    pub fn signaling_url(&self) -> &str {
        &self.0.core.config.signaling_url
    }

    pub fn send(&self, text: &str) -> Result<(), Box<dyn Error>> {
        send_text(self.0.as_ref(), text)
    }

    pub fn close_signaling(&self) {
        close_signaling(self.0.as_ref());
    }

    pub fn dispose(&self) {
        if self.0.core.is_disposed.replace(true) {
            return;
        }
        debug!("disposing {}", self.describe());
        close_signaling(self.0.as_ref());
        close_data_channel(self.0.as_ref());
        close_peer(self.0.as_ref());
        self.0.core.events.dispose();
    }
}

impl JoinerImpl {
    fn handle(&self) -> Option<RtcJoiner> {
        self.me.upgrade().map(RtcJoiner)
    }

    fn init_peer(&self) -> Result<Rc<dyn PeerConnection>, Box<dyn Error>> {
        if let Some(pc) = self.peer_connection() {
            return Ok(pc);
        }
        let settings = &self.core.context.settings;
        let pc = self
            .core
            .context
            .peers
            .create_peer(&settings.peer_configuration)?;
        pc.set_event_sink(Some(peer_sink(self.me.clone())));
        self.core.link.borrow_mut().pc = Some(pc.clone());
        Ok(pc)
    }

    fn on_fetched_offer(&self, message: &Value) {
        let id_somebody_creator = message
            .get("idSomebodyCreator")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let id_offer = message.get("idOffer").and_then(Value::as_u64).unwrap_or(0);
        let context = format!("while fetching offer for {:?}", id_somebody_creator);
        let pc = match self.init_peer() {
            Ok(pc) => pc,
            Err(e) => {
                self.on_error(&format!("Failed to create peer connection ({}): {}", context, e));
                return;
            }
        };
        *self.id_somebody_creator.borrow_mut() = Some(id_somebody_creator.clone());
        self.id_offer.set(Some(id_offer));
        debug!(
            "{} fetched offer {} from creator {}",
            self.describe(),
            id_offer,
            id_somebody_creator
        );
        self.emit(
            Event::new("signalingPassedFetchOffer")
                .with("idSomebodyOtherSide", id_somebody_creator.as_str())
                .with("idOffer", id_offer),
        );
        let offer = match SessionDescription::from_value(message.get("offer").unwrap_or(&Value::Null)) {
            Ok(offer) => offer,
            Err(e) => {
                self.on_error(&format!("Failed to set remote description ({}): {}", context, e));
                return;
            }
        };
        let me = self.me.clone();
        pc.set_remote_description(
            offer,
            Box::new(move |result| {
                let joiner = match me.upgrade() {
                    Some(joiner) if !joiner.is_disposed() => joiner,
                    _ => return,
                };
                match result {
                    Ok(()) => {
                        joiner.emit(Event::new("remoteDescriptionSet"));
                        joiner.create_answer(context);
                    }
                    Err(e) => joiner
                        .on_error(&format!("Failed to set remote description ({}): {}", context, e)),
                }
            }),
        );
    }

    fn create_answer(&self, context: String) {
        let pc = match self.peer_connection() {
            Some(pc) => pc,
            None => return,
        };
        let me = self.me.clone();
        pc.create_answer(
            &self.core.config.offer_options,
            Box::new(move |result| {
                let joiner = match me.upgrade() {
                    Some(joiner) if !joiner.is_disposed() => joiner,
                    _ => return,
                };
                match result {
                    Ok(answer) => {
                        joiner.emit(Event::new("answerCreated"));
                        joiner.set_local(answer, context);
                    }
                    Err(e) => {
                        joiner.on_error(&format!("Failed to create answer ({}): {}", context, e))
                    }
                }
            }),
        );
    }

    fn set_local(&self, answer: SessionDescription, context: String) {
        let pc = match self.peer_connection() {
            Some(pc) => pc,
            None => return,
        };
        let me = self.me.clone();
        pc.set_local_description(
            answer,
            Box::new(move |result| {
                let joiner = match me.upgrade() {
                    Some(joiner) if !joiner.is_disposed() => joiner,
                    _ => return,
                };
                match result {
                    Ok(()) => {
                        joiner.emit(Event::new("localDescriptionSet"));
                        joiner.on_other_side_identified();
                    }
                    Err(e) => joiner.on_error(&format!(
                        "Failed to set local description ({}): {}",
                        context, e
                    )),
                }
            }),
        );
    }

    fn on_other_side_identified(&self) {
        let other_side = self.id_somebody_creator.borrow().clone().unwrap_or_default();
        self.core.link.borrow_mut().was_identified = true;
        debug!("{} identified creator {}", self.describe(), other_side);
        self.emit(Event::new("identified").with("idSomebodyOtherSide", other_side));
    }

    fn publish_answer(&self) -> Result<(), Box<dyn Error>> {
        let answer = self
            .peer_connection()
            .and_then(|pc| pc.local_description())
            .ok_or("answer is not set locally")?;
        let mut message = new_call("signalingPublishAnswer");
        message.insert("answer".to_string(), answer.to_value());
        message.insert("idRtcParticipant".to_string(), json!(self.participant_id()));
        message.insert(
            "idSomebodyCreator".to_string(),
            json!(self.id_somebody_creator.borrow().clone().unwrap_or_default()),
        );
        message.insert("idOffer".to_string(), json!(self.id_offer.get().unwrap_or(0)));
        self.core.call(message)
    }
}

impl Participant for JoinerImpl {
    fn link(&self) -> &RefCell<PeerLink> {
        &self.core.link
    }

    fn is_disposed(&self) -> bool {
        self.core.is_disposed.get()
    }

    fn describe(&self) -> String {
        self.core.describe(self.is_disposed())
    }

    fn emit(&self, event: Event) {
        match self.handle() {
            Some(joiner) => self.core.events.dispatch(&event.attach(joiner)),
            None => self.core.events.dispatch(&event),
        }
    }

    fn on_error(&self, reason: &str) {
        fail(self, reason);
    }

    fn on_ice_candidate(&self, candidate: Option<IceCandidate>) {
        if self.core.signaling_pipe().is_none() {
            // Late candidates after signaling was dropped on purpose
            if self.core.link.borrow().dc.is_some() {
                return;
            }
            self.on_error("Failed to process ICE candidate: no connection to signaling server");
            return;
        }
        let ready = candidate.is_none() || self.core.context.settings.fast_publish_joiner;
        if !ready || self.answer_published.get() {
            return;
        }
        self.answer_published.set(true);
        if let Err(e) = self.publish_answer() {
            self.on_error(&format!("Failed to process ICE candidate: {}", e));
        }
    }

    fn on_remote_channel(&self, channel: Rc<dyn DataChannel>) {
        let label = channel.label();
        watch_channel(self.me.clone(), &channel);
        let displaced = self.core.link.borrow_mut().dc.replace(channel);
        if let Some(displaced) = displaced {
            displaced.set_event_sink(None);
            displaced.close();
        }
        self.emit(Event::new("dataChannelAvailable").with("label", label));
    }
}

impl Actor for JoinerImpl {
    fn core(&self) -> &ActorCore {
        &self.core
    }

    fn on_impersonation_complete(&self) {
        if let Err(e) = self.core.call(new_call("signalingFetchOffer")) {
            self.on_error(&format!("Failed to fetch offer: {}", e));
        }
    }

    fn on_role_message(&self, method: &str, message: &Value) -> bool {
        if method != "signalingFetchOffer" {
            return false;
        }
        match answer_error(message) {
            None => self.on_fetched_offer(message),
            Some(error) => {
                self.emit(Event::new("signalingFailedFetchOffer").with("error", error.as_str()));
                self.on_error(&error);
            }
        }
        true
    }
}

impl EventSource for RtcJoiner {
    fn dispatcher(&self) -> &EventDispatcher {
        &self.0.core.events
    }
}

impl Debug for RtcJoiner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.describe())
    }
}
