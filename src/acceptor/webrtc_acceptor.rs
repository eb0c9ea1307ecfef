use super::*;
use std::ops::Deref;

#[derive(Debug, Clone, PartialEq)]
pub struct WebRtcAcceptorSettings {
    /// Offers kept published at once, at least 1
    pub max_active_offers: usize,
    /// Zero disables the timeout
    pub time_to_publish: Duration,
    /// Zero disables the timeout
    pub time_to_signaling_negotiation: Duration,
}

impl Default for WebRtcAcceptorSettings {
    fn default() -> Self {
        Self {
            max_active_offers: 10,
            time_to_publish: Duration::ZERO,
            time_to_signaling_negotiation: Duration::ZERO,
        }
    }
}

struct PendingOffer {
    peer: ServerPeer,
    listeners: Vec<(&'static str, Listener)>,
}

impl PendingOffer {
    fn detach(&self) {
        for (kind, listener) in &self.listeners {
            self.peer.off(kind, Some(listener));
        }
    }
}

struct WebRtcAcceptorImpl {
    me: Weak<WebRtcAcceptorImpl>,
    acceptor: Acceptor,
    creator: RtcCreator,
    settings: WebRtcAcceptorSettings,
    pending: RefCell<BTreeMap<u64, PendingOffer>>,
}

/// Accepts WebRTC clients by keeping a number of offers published on a signaling server. Each
/// answered offer becomes a server pipe.
///
/// On top of the usual acceptor events: "signalingPassedImpersonation",
/// "signalingFailedImpersonation", "identified" (field "idSomebodyOtherSide", the ServerPeer
/// attached) and "peerLocalDescriptionSet". "error" events carry "errorType", one of
/// "signalingPipeError", "rtcPeerError" or "rtcCreatorError".
#[derive(Clone)]
pub struct WebRtcAcceptor(Rc<WebRtcAcceptorImpl>);

impl WebRtcAcceptor {
    pub fn new(
        context: &RtcContext,
        config: &ActorConfig,
        settings: &WebRtcAcceptorSettings,
        pipe_settings: &PipeSettings,
    ) -> Result<Self, Box<dyn Error>> {
        let creator = RtcCreator::new(context, config)?;
        let acceptor = Acceptor::new(
            AcceptorKind::WebRtc,
            creator.signaling_url(),
            &context.event_loop,
            pipe_settings,
        );
        let settings = WebRtcAcceptorSettings {
            max_active_offers: settings.max_active_offers.max(1),
            ..settings.clone()
        };
        let inner = Rc::new_cyclic(|me| WebRtcAcceptorImpl {
            me: me.clone(),
            acceptor,
            creator,
            settings,
            pending: RefCell::new(BTreeMap::new()),
        });
        inner.watch_creator();
        let weak = Rc::downgrade(&inner);
        inner.acceptor.on_teardown(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove_all_pending_offers();
                inner.creator.dispose();
            }
        });
        inner.acceptor.announce_open();
        debug!("{} accepting WebRTC clients", inner.creator.describe());
        Ok(Self(inner))
    }

    pub fn acceptor(&self) -> &Acceptor {
        &self.0.acceptor
    }

    pub fn creator(&self) -> &RtcCreator {
        &self.0.creator
    }

    pub fn pending_offer_count(&self) -> usize {
        self.0.pending.borrow().len()
    }
}

impl WebRtcAcceptorImpl {
    fn watch_creator(&self) {
        let relay = |kind: &'static str| {
            let me = self.me.clone();
            listener(move |_| {
                if let Some(inner) = me.upgrade() {
                    if kind == "signalingPassedImpersonation" {
                        inner.update_pending_offers();
                    }
                    inner.acceptor.emit(Event::new(kind));
                }
            })
        };
        let error = |error_type: &'static str| {
            let me = self.me.clone();
            listener(move |event| {
                if let Some(inner) = me.upgrade() {
                    inner.emit_error(event.str_field("error").unwrap_or(error_type), error_type);
                }
            })
        };
        self.creator
            .on("signalingPassedImpersonation", &relay("signalingPassedImpersonation"));
        self.creator
            .on("signalingFailedImpersonation", &relay("signalingFailedImpersonation"));
        self.creator
            .on("rtcParticipantError", &error("rtcCreatorError"));
        self.creator
            .on("signalingPipeError", &error("signalingPipeError"));
    }

    fn emit_error(&self, message: &str, error_type: &str) {
        self.acceptor.emit(
            Event::new("error")
                .with("message", message)
                .with("errorType", error_type),
        );
    }

    fn update_pending_offers(&self) {
        if !self.acceptor.is_listening() || !self.creator.is_impersonated() {
            return;
        }
        while self.pending.borrow().len() < self.settings.max_active_offers {
            if let Err(e) = self.add_pending_offer() {
                self.emit_error(&e.to_string(), "rtcCreatorError");
                return;
            }
        }
    }

    fn add_pending_offer(&self) -> Result<(), Box<dyn Error>> {
        let peer = self.creator.allocate_server_peer(
            self.settings.time_to_publish,
            self.settings.time_to_signaling_negotiation,
        )?;
        let id_offer = peer.id_offer();
        let on_identified = {
            let me = self.me.clone();
            listener(move |event| {
                if let (Some(inner), Some(peer)) = (me.upgrade(), event.get::<ServerPeer>()) {
                    inner.on_identified(peer, event.str_field("idSomebodyOtherSide").unwrap_or(""));
                }
            })
        };
        let on_local_description = {
            let me = self.me.clone();
            listener(move |_| {
                if let Some(inner) = me.upgrade() {
                    inner
                        .acceptor
                        .emit(Event::new("peerLocalDescriptionSet").with("idOffer", id_offer));
                }
            })
        };
        let on_timeout = {
            let me = self.me.clone();
            listener(move |event| {
                if let Some(inner) = me.upgrade() {
                    debug!("offer {} dropped after {}", id_offer, event.kind());
                    inner.drop_pending_offer_later(id_offer);
                }
            })
        };
        let on_error = {
            let me = self.me.clone();
            listener(move |event| {
                if let Some(inner) = me.upgrade() {
                    inner.emit_error(
                        event.str_field("error").unwrap_or("WebRTC peer error"),
                        "rtcPeerError",
                    );
                    inner.drop_pending_offer_later(id_offer);
                }
            })
        };
        let listeners = vec![
            ("identified", on_identified),
            ("localDescriptionSet", on_local_description),
            ("publishTimeout", on_timeout.clone()),
            ("signalingNegotiationTimeout", on_timeout),
            ("rtcParticipantError", on_error),
        ];
        for (kind, listener) in &listeners {
            peer.on(kind, listener);
        }
        self.pending.borrow_mut().insert(
            id_offer,
            PendingOffer {
                peer: peer.clone(),
                listeners,
            },
        );
        peer.publish();
        Ok(())
    }

    fn on_identified(&self, peer: &ServerPeer, id_somebody_other_side: &str) {
        if peer.is_disposed() {
            return;
        }
        let pending = self.pending.borrow_mut().remove(&peer.id_offer());
        if let Some(pending) = pending {
            pending.detach();
        }
        debug!(
            "{} is now talking to {}",
            peer.describe(),
            id_somebody_other_side
        );
        WebRtcServerPipe::new(&self.acceptor, peer, self.creator.signaling_url());
        self.acceptor.emit(
            Event::new("identified")
                .with("idSomebodyOtherSide", id_somebody_other_side)
                .attach(peer.clone()),
        );
        self.update_pending_offers();
    }

    /// Runs on the next tick, the peer may still be dispatching
    fn drop_pending_offer_later(&self, id_offer: u64) {
        let me = self.me.clone();
        self.acceptor.event_loop().defer(move || {
            if let Some(inner) = me.upgrade() {
                let pending = inner.pending.borrow_mut().remove(&id_offer);
                if let Some(pending) = pending {
                    pending.detach();
                    pending.peer.dispose();
                }
                inner.update_pending_offers();
            }
        });
    }

    fn remove_all_pending_offers(&self) {
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        for (_, pending) in pending {
            pending.detach();
            pending.peer.dispose();
        }
    }
}

impl Deref for WebRtcAcceptor {
    type Target = Acceptor;

    fn deref(&self) -> &Self::Target {
        &self.0.acceptor
    }
}

impl Debug for WebRtcAcceptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} ({} pending offers)",
            self.0.acceptor,
            self.pending_offer_count()
        )
    }
}
