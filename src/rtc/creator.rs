use super::*;

pub(crate) struct CreatorImpl {
    me: Weak<CreatorImpl>,
    core: ActorCore,
    next_offer: Cell<u64>,
    /// Published offers still waiting for an answer, by offer id
    server_offers: RefCell<BTreeMap<u64, ServerPeer>>,
    /// Answered offers, by the id of the joiner on the other side
    server_peers: RefCell<HashMap<String, ServerPeer>>,
}

/// Publishes offers through the signaling server and keeps one [`ServerPeer`] per offer.
///
/// Events: "signalingPipeOpen", "signalingPipeClose", "signalingPipeError",
/// "signalingClosed", "signalingPassedImpersonation", "signalingFailedImpersonation",
/// "signalingPassedOfferPublish", "signalingFailedOfferPublish",
/// "signalingPassedPublishAnswer", "signalingFailedPublishAnswer", "remoteDescriptionSet",
/// "publishTimeout" and "signalingNegotiationTimeout" (relayed from its peers),
/// "rtcPeerError" (the failing ServerPeer attached), "rtcParticipantError" and "dispose".
#[derive(Clone)]
pub struct RtcCreator(Rc<CreatorImpl>);

#[derive(Clone)]
pub(crate) struct WeakRtcCreator(Weak<CreatorImpl>);

impl WeakRtcCreator {
    pub fn upgrade(&self) -> Option<RtcCreator> {
        self.0.upgrade().map(RtcCreator)
    }
}

impl RtcCreator {
    /// Fails only if the signaling pipe can't be created. Everything after that is reported
    /// through events.
    pub fn new(context: &RtcContext, config: &ActorConfig) -> Result<Self, Box<dyn Error>> {
        let inner = Rc::new_cyclic(|me| CreatorImpl {
            me: me.clone(),
            core: ActorCore::new(Role::Creator, context, config),
            next_offer: Cell::new(1),
            server_offers: RefCell::new(BTreeMap::new()),
            server_peers: RefCell::new(HashMap::new()),
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

    pub fn is_disposed(&self) -> bool {
        self.0.is_disposed()
    }

    pub fn signaling_pipe(&self) -> Option<Pipe> {
        self.0.core.signaling_pipe()
    }

    pub fn signaling_url(&self) -> &str {
        &self.0.core.config.signaling_url
    }

    pub fn pending_offer_count(&self) -> usize {
        self.0.server_offers.borrow().len()
    }

    pub fn identified_peers(&self) -> Vec<ServerPeer> {
        self.0.server_peers.borrow().values().cloned().collect()
    }

    /// The peer talking to the given joiner
    pub fn server_peer(&self, id_somebody_other_side: &str) -> Option<ServerPeer> {
        self.0.server_peers.borrow().get(id_somebody_other_side).cloned()
    }

    /// Creates the peer for the next offer id. Call publish() on it once listeners are
    /// attached.
    pub fn allocate_server_peer(
        &self,
        time_to_publish: Duration,
        time_to_negotiate: Duration,
    ) -> Result<ServerPeer, Box<dyn Error>> {
        if self.is_disposed() {
            return Err(format!("{} is disposed", self.describe()).into());
        }
        let id_offer = self.0.next_offer.get();
        self.0.next_offer.set(id_offer + 1);
        let peer = ServerPeer::new(self, id_offer, time_to_publish, time_to_negotiate)?;
        self.0
            .server_offers
            .borrow_mut()
            .insert(id_offer, peer.clone());
        Ok(peer)
    }

    /// Sends to every identified peer. Peers that fail report it themselves.
    pub fn send<P: Into<Payload>>(&self, data: P) {
        let text = data.into().marshal();
        for peer in self.identified_peers() {
            peer.send(&text)
                .or_log_warn(&format!("{} broadcasting", self.describe()));
        }
    }

    /// Stops talking to the signaling server. Established peers are unaffected.
    pub fn close_signaling(&self) {
        close_signaling(self.0.as_ref());
    }

    pub fn dispose(&self) {
        if self.0.core.is_disposed.replace(true) {
            return;
        }
        debug!("disposing {}", self.describe());
        let offers = std::mem::take(&mut *self.0.server_offers.borrow_mut());
        let peers = std::mem::take(&mut *self.0.server_peers.borrow_mut());
        for peer in offers.into_iter().map(|(_, peer)| peer).chain(peers.into_iter().map(|(_, peer)| peer)) {
            peer.dispose();
        }
        close_signaling(self.0.as_ref());
        close_data_channel(self.0.as_ref());
        close_peer(self.0.as_ref());
        self.0.core.events.dispose();
    }

    pub fn downgrade(&self) -> WeakRtcCreator {
        WeakRtcCreator(Rc::downgrade(&self.0))
    }

    pub(crate) fn context(&self) -> &RtcContext {
        &self.0.core.context
    }

    pub(crate) fn offer_options(&self) -> OfferOptions {
        self.0.core.config.offer_options.clone()
    }

    pub(crate) fn call(&self, message: Envelope) -> Result<(), Box<dyn Error>> {
        self.0.core.call(message)
    }

    pub(crate) fn emit(&self, event: Event) {
        self.0.emit(event);
    }

    pub(crate) fn on_rtc_peer_error(&self, peer: &ServerPeer, reason: &str) {
        self.emit(
            Event::new("rtcPeerError")
                .with("error", reason)
                .with("idOffer", peer.id_offer())
                .attach(peer.clone()),
        );
    }

    /// Drops the creator's references to the peer
    pub(crate) fn forget_peer(&self, peer: &ServerPeer, other_side: Option<&str>) {
        let mut offers = self.0.server_offers.borrow_mut();
        if offers
            .get(&peer.id_offer())
            .map_or(false, |registered| registered.ptr_eq(peer))
        {
            offers.remove(&peer.id_offer());
        }
        drop(offers);
        if let Some(other_side) = other_side {
            let mut peers = self.0.server_peers.borrow_mut();
            if peers
                .get(other_side)
                .map_or(false, |registered| registered.ptr_eq(peer))
            {
                peers.remove(other_side);
            }
        }
    }
}

impl CreatorImpl {
    fn handle(&self) -> Option<RtcCreator> {
        self.me.upgrade().map(RtcCreator)
    }

    fn on_publish_answer(&self, message: &Value) {
        let id_somebody_other_side = message
            .get("idSomebody_joiner")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let id_offer = message.get("idOffer").and_then(Value::as_u64).unwrap_or(0);
        let peer = self.server_offers.borrow().get(&id_offer).cloned();
        let peer = match peer {
            Some(peer) => peer,
            None => {
                self.on_error("not a registered pending offer(signalingPublishAnswer)");
                return;
            }
        };
        self.emit(
            Event::new("signalingPassedPublishAnswer")
                .with("idSomebodyOtherSide", id_somebody_other_side.as_str())
                .with("idOffer", id_offer),
        );
        let answer = match SessionDescription::from_value(
            message.get("answer").unwrap_or(&Value::Null),
        ) {
            Ok(answer) => answer,
            Err(e) => {
                peer.fail(&format!("Failed to set remote description: {}", e));
                return;
            }
        };
        let pc = match peer.peer_connection() {
            Some(pc) => pc,
            None => return,
        };
        if pc.signaling_state() != SignalingState::HaveLocalOffer {
            debug!(
                "{} in state {} skips answer from {}",
                peer.describe(),
                pc.signaling_state(),
                id_somebody_other_side
            );
            return;
        }
        let me = self.me.clone();
        pc.set_remote_description(
            answer,
            Box::new(move |result| {
                let creator = match me.upgrade() {
                    Some(creator) if !creator.is_disposed() && !peer.is_disposed() => creator,
                    _ => return,
                };
                match result {
                    Ok(()) => {
                        creator.emit(Event::new("remoteDescriptionSet").with("idOffer", id_offer));
                        creator.on_other_side_identified(&id_somebody_other_side, id_offer);
                    }
                    Err(e) => peer.fail(&format!("Failed to set remote description: {}", e)),
                }
            }),
        );
    }

    fn on_other_side_identified(&self, id_somebody_other_side: &str, id_offer: u64) {
        let peer = self.server_offers.borrow_mut().remove(&id_offer);
        let peer = match peer {
            Some(peer) => peer,
            None => {
                self.on_error("not a registered pending offer(onOtherSideIdentified)");
                return;
            }
        };
        debug!(
            "{} identified joiner {} through offer {}",
            self.describe(),
            id_somebody_other_side,
            id_offer
        );
        let displaced = self
            .server_peers
            .borrow_mut()
            .insert(id_somebody_other_side.to_string(), peer.clone());
        if let Some(displaced) = displaced {
            warn!("{} replaces {}", peer.describe(), displaced.describe());
            displaced.dispose();
        }
        peer.on_other_side_identified(id_somebody_other_side);
    }
}

impl Participant for CreatorImpl {
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
            Some(creator) => self.core.events.dispatch(&event.attach(creator)),
            None => self.core.events.dispatch(&event),
        }
    }

    fn on_error(&self, reason: &str) {
        fail(self, reason);
    }

    fn on_ice_candidate(&self, _candidate: Option<IceCandidate>) {}
}

impl Actor for CreatorImpl {
    fn core(&self) -> &ActorCore {
        &self.core
    }

    fn on_impersonation_complete(&self) {}

    fn on_role_message(&self, method: &str, message: &Value) -> bool {
        match method {
            "signalingPublishOffer" => match answer_error(message) {
                None => self.emit(
                    Event::new("signalingPassedOfferPublish")
                        .with("idOffer", message.get("idOffer").cloned().unwrap_or(Value::Null)),
                ),
                Some(error) => {
                    self.emit(Event::new("signalingFailedOfferPublish").with("error", error.as_str()));
                    self.on_error(&error);
                }
            },
            "signalingPublishAnswer" => match answer_error(message) {
                None => self.on_publish_answer(message),
                Some(error) => {
                    self.emit(Event::new("signalingFailedPublishAnswer").with("error", error.as_str()));
                    self.on_error(&error);
                }
            },
            _ => return false,
        }
        true
    }
}

impl EventSource for RtcCreator {
    fn dispatcher(&self) -> &EventDispatcher {
        &self.0.core.events
    }
}

impl Debug for RtcCreator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} with {} pending offers and {} peers",
            self.describe(),
            self.pending_offer_count(),
            self.0.server_peers.borrow().len()
        )
    }
}
