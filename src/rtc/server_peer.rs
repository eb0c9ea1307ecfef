use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPeerState {
    Init,
    Publishing,
    SignalingNegotiation,
    Identified,
    PublishTimeout,
    SignalingNegotiationTimeout,
    Error,
    Disposed,
}

pub(crate) struct ServerPeerImpl {
    me: Weak<ServerPeerImpl>,
    creator: WeakRtcCreator,
    id_offer: u64,
    context: RtcContext,
    offer_options: OfferOptions,
    time_to_publish: Duration,
    time_to_negotiate: Duration,
    events: EventDispatcher,
    link: RefCell<PeerLink>,
    state: Cell<ServerPeerState>,
    other_side: RefCell<Option<String>>,
    offer_published: Cell<bool>,
    publish_timer: Cell<Option<TimerKey>>,
    negotiation_timer: Cell<Option<TimerKey>>,
}

/// The creator's side of one published offer. Created through
/// [`RtcCreator::allocate_server_peer`]; call [`ServerPeer::publish`] once listeners are
/// attached.
///
/// Events: "publishStart", "offerCreated", "localDescriptionSet", "signalingNegotiationStart",
/// "publishTimeout", "signalingNegotiationTimeout", "identified" (field
/// "idSomebodyOtherSide"), the data channel events, "peerClose", "rtcParticipantError" and
/// "dispose".
#[derive(Clone)]
pub struct ServerPeer(Rc<ServerPeerImpl>);

impl ServerPeer {
    pub(crate) fn new(
        creator: &RtcCreator,
        id_offer: u64,
        time_to_publish: Duration,
        time_to_negotiate: Duration,
    ) -> Result<Self, Box<dyn Error>> {
        let context = creator.context().clone();
        let inner = Rc::new_cyclic(|me| ServerPeerImpl {
            me: me.clone(),
            creator: creator.downgrade(),
            id_offer,
            offer_options: creator.offer_options(),
            context,
            time_to_publish,
            time_to_negotiate,
            events: EventDispatcher::new(),
            link: RefCell::new(PeerLink::new(None)),
            state: Cell::new(ServerPeerState::Init),
            other_side: RefCell::new(None),
            offer_published: Cell::new(false),
            publish_timer: Cell::new(None),
            negotiation_timer: Cell::new(None),
        });
        inner.init_peer()?;
        Ok(Self(inner))
    }

    pub fn id_offer(&self) -> u64 {
        self.0.id_offer
    }

    pub fn state(&self) -> ServerPeerState {
        self.0.state.get()
    }

    pub fn id(&self) -> String {
        self.0.participant_id()
    }

    /// The joiner this peer ended up talking to
    pub fn other_side(&self) -> Option<String> {
        self.0.other_side.borrow().clone()
    }

    pub fn is_identified(&self) -> bool {
        self.0.link.borrow().was_identified
    }

    pub fn is_ice_complete(&self) -> bool {
        self.0.link.borrow().ice_complete
    }

    pub fn is_disposed(&self) -> bool {
        self.0.is_disposed()
    }

    pub fn describe(&self) -> String {
        self.0.describe()
    }

    pub fn ptr_eq(&self, other: &ServerPeer) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Creates the offer and sets it locally. The offer goes to the signaling server once ICE
    /// gathering is far enough along.
    pub fn publish(&self) {
        self.0.publish();
    }

    pub fn send(&self, text: &str) -> Result<(), Box<dyn Error>> {
        send_text(self.0.as_ref(), text)
    }

    pub fn dispose(&self) {
        self.0.dispose();
    }

    pub(crate) fn on_other_side_identified(&self, id_somebody_other_side: &str) {
        self.0.on_other_side_identified(id_somebody_other_side);
    }

    pub(crate) fn fail(&self, reason: &str) {
        self.0.on_error(reason);
    }

    pub(crate) fn peer_connection(&self) -> Option<Rc<dyn PeerConnection>> {
        self.0.peer_connection()
    }
}

impl ServerPeerImpl {
    fn handle(&self) -> Option<ServerPeer> {
        self.me.upgrade().map(ServerPeer)
    }

    fn init_peer(&self) -> Result<(), Box<dyn Error>> {
        let pc = self
            .context
            .peers
            .create_peer(&self.context.settings.peer_configuration)?;
        pc.set_event_sink(Some(peer_sink(self.me.clone())));
        let dc = match pc.create_data_channel(&self.context.settings.data_channel_label) {
            Ok(dc) => dc,
            Err(e) => {
                pc.close();
                return Err(e);
            }
        };
        watch_channel(self.me.clone(), &dc);
        let mut link = self.link.borrow_mut();
        link.pc = Some(pc);
        link.dc = Some(dc);
        Ok(())
    }

    fn cancel_timers(&self) {
        for timer in [&self.publish_timer, &self.negotiation_timer].iter() {
            if let Some(key) = timer.take() {
                self.context.event_loop.cancel(key);
            }
        }
    }

    fn publish(&self) {
        if self.is_disposed() {
            return;
        }
        match self.state.get() {
            ServerPeerState::Init => (),
            state => {
                debug!("{} will not publish in state {:?}", self.describe(), state);
                return;
            }
        }
        let has_signaling = self
            .creator
            .upgrade()
            .map_or(false, |creator| creator.signaling_pipe().is_some());
        let pc = match (has_signaling, self.peer_connection()) {
            (true, Some(pc)) => pc,
            _ => {
                debug!("{} has nothing to publish through", self.describe());
                return;
            }
        };
        self.state.set(ServerPeerState::Publishing);
        if self.time_to_publish > Duration::ZERO {
            let me = self.me.clone();
            let key = self.context.event_loop.schedule(self.time_to_publish, move || {
                if let Some(peer) = me.upgrade() {
                    peer.publish_timer.set(None);
                    peer.on_timeout(
                        ServerPeerState::Publishing,
                        ServerPeerState::PublishTimeout,
                        "publishTimeout",
                    );
                }
            });
            self.publish_timer.set(Some(key));
        }
        self.emit(Event::new("publishStart"));
        let me = self.me.clone();
        pc.create_offer(
            &self.offer_options,
            Box::new(move |result| {
                let peer = match me.upgrade() {
                    Some(peer) if peer.state.get() == ServerPeerState::Publishing => peer,
                    _ => return,
                };
                match result {
                    Ok(offer) => peer.on_offer_created(offer),
                    Err(e) => {
                        peer.cancel_timers();
                        peer.on_error(&format!("Failed to create offer: {}", e));
                    }
                }
            }),
        );
    }

    fn on_offer_created(&self, offer: SessionDescription) {
        trace!("{} offer created", self.describe());
        self.emit(Event::new("offerCreated"));
        let pc = match self.peer_connection() {
            Some(pc) => pc,
            None => return,
        };
        let me = self.me.clone();
        pc.set_local_description(
            offer,
            Box::new(move |result| {
                let peer = match me.upgrade() {
                    Some(peer) if peer.state.get() == ServerPeerState::Publishing => peer,
                    _ => return,
                };
                match result {
                    Ok(()) => peer.emit(Event::new("localDescriptionSet")),
                    Err(e) => {
                        peer.cancel_timers();
                        peer.on_error(&format!("Failed to set local description: {}", e));
                    }
                }
            }),
        );
    }

    fn publish_offer(&self) -> Result<(), Box<dyn Error>> {
        let creator = self.creator.upgrade().ok_or("creator is gone")?;
        let offer = self
            .peer_connection()
            .and_then(|pc| pc.local_description())
            .ok_or("offer is not set locally")?;
        let mut message = new_call("signalingPublishOffer");
        message.insert("offer".to_string(), offer.to_value());
        message.insert("idSomebodyCreator".to_string(), json!(creator.id()));
        message.insert("idOffer".to_string(), json!(self.id_offer));
        creator.call(message)?;
        if let Some(key) = self.publish_timer.take() {
            self.context.event_loop.cancel(key);
        }
        self.state.set(ServerPeerState::SignalingNegotiation);
        self.emit(Event::new("signalingNegotiationStart"));
        if self.time_to_negotiate > Duration::ZERO && !self.is_disposed() {
            let me = self.me.clone();
            let key = self.context.event_loop.schedule(self.time_to_negotiate, move || {
                if let Some(peer) = me.upgrade() {
                    peer.negotiation_timer.set(None);
                    peer.on_timeout(
                        ServerPeerState::SignalingNegotiation,
                        ServerPeerState::SignalingNegotiationTimeout,
                        "signalingNegotiationTimeout",
                    );
                }
            });
            self.negotiation_timer.set(Some(key));
        }
        Ok(())
    }

    /// Fires only if the peer is still in the state the timer was guarding. The peer is torn
    /// down once the timeout has been reported.
    fn on_timeout(&self, guarded: ServerPeerState, next: ServerPeerState, kind: &str) {
        if self.is_disposed() || self.state.get() != guarded {
            return;
        }
        warn!("{} timed out ({})", self.describe(), kind);
        self.cancel_timers();
        self.state.set(next);
        self.emit(Event::new(kind));
        if let (Some(creator), Some(peer)) = (self.creator.upgrade(), self.handle()) {
            creator.emit(Event::new(kind).with("idOffer", self.id_offer).attach(peer));
        }
        self.dispose();
    }

    fn on_other_side_identified(&self, id_somebody_other_side: &str) {
        if self.is_disposed() {
            return;
        }
        self.cancel_timers();
        *self.other_side.borrow_mut() = Some(id_somebody_other_side.to_string());
        self.link.borrow_mut().was_identified = true;
        self.state.set(ServerPeerState::Identified);
        debug!("{} identified {}", self.describe(), id_somebody_other_side);
        self.emit(Event::new("identified").with("idSomebodyOtherSide", id_somebody_other_side));
    }

    fn forget_in_creator(&self) {
        if let Some(creator) = self.creator.upgrade() {
            let other_side = self.other_side.borrow().clone();
            if let Some(peer) = self.handle() {
                creator.forget_peer(&peer, other_side.as_deref());
            }
        }
    }

    fn dispose(&self) {
        if self.is_disposed() {
            return;
        }
        self.state.set(ServerPeerState::Disposed);
        self.cancel_timers();
        self.forget_in_creator();
        close_data_channel(self);
        close_peer(self);
        self.events.dispose();
    }
}

impl Participant for ServerPeerImpl {
    fn link(&self) -> &RefCell<PeerLink> {
        &self.link
    }

    fn is_disposed(&self) -> bool {
        self.state.get() == ServerPeerState::Disposed
    }

    fn describe(&self) -> String {
        self.link.borrow().describe(
            "server-peer",
            self.is_disposed(),
            &[format!("offer {}", self.id_offer)],
        )
    }

    fn emit(&self, event: Event) {
        match self.handle() {
            Some(peer) => self.events.dispatch(&event.attach(peer)),
            None => self.events.dispatch(&event),
        }
    }

    fn on_error(&self, reason: &str) {
        if self.is_disposed() || self.state.get() == ServerPeerState::Error {
            debug!("{} ignores late error: {}", self.describe(), reason);
            return;
        }
        self.cancel_timers();
        self.state.set(ServerPeerState::Error);
        close_data_channel(self);
        close_peer(self);
        self.forget_in_creator();
        if let (Some(creator), Some(peer)) = (self.creator.upgrade(), self.handle()) {
            creator.on_rtc_peer_error(&peer, reason);
        }
        fail(self, reason);
    }

    fn on_ice_candidate(&self, candidate: Option<IceCandidate>) {
        let ready = candidate.is_none() || self.context.settings.fast_publish_server_peer;
        if !ready || self.offer_published.get() {
            return;
        }
        if self.state.get() != ServerPeerState::Publishing {
            return;
        }
        self.offer_published.set(true);
        if let Err(e) = self.publish_offer() {
            self.cancel_timers();
            self.on_error(&format!("Failed to process ICE candidate: {}", e));
        }
    }
}

impl EventSource for ServerPeer {
    fn dispatcher(&self) -> &EventDispatcher {
        &self.0.events
    }
}

impl Debug for ServerPeer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} in state {:?}", self.describe(), self.state())
    }
}
