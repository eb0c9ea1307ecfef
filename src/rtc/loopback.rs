//! In-process WebRTC stand-in. Peers created by the same [`LoopbackNetwork`] find each other
//! through their session descriptions and get linked data channels once both sides are stable.

use super::*;

const SDP_PREFIX: &str = "loopback-peer:";

/// One-shot failures that tests can arm on the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopbackFault {
    CreatePeer,
    CreateOffer,
    CreateAnswer,
    SetLocalDescription,
    SetRemoteDescription,
    /// ICE reports "failed" instead of gathering candidates
    IceFailure,
    /// Gathering never reports anything
    SilentGathering,
}

struct NetworkImpl {
    event_loop: EventLoop,
    peers: RefCell<HashMap<u64, Weak<LoopbackPeer>>>,
    next_id: Cell<u64>,
    faults: RefCell<HashSet<LoopbackFault>>,
}

#[derive(Clone)]
pub struct LoopbackNetwork(Rc<NetworkImpl>);

impl LoopbackNetwork {
    pub fn new(event_loop: &EventLoop) -> Self {
        Self(Rc::new(NetworkImpl {
            event_loop: event_loop.clone(),
            peers: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
            faults: RefCell::new(HashSet::new()),
        }))
    }

    /// The next operation of this kind on any peer fails
    pub fn fail_next(&self, fault: LoopbackFault) {
        self.0.faults.borrow_mut().insert(fault);
    }

    fn take_fault(&self, fault: LoopbackFault) -> bool {
        self.0.faults.borrow_mut().remove(&fault)
    }

    /// Peers that are still alive and not closed
    pub fn live_peer_count(&self) -> usize {
        self.0
            .peers
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .filter(|peer| !peer.state.borrow().closed)
            .count()
    }

    fn peer(&self, id: u64) -> Option<Rc<LoopbackPeer>> {
        self.0.peers.borrow().get(&id).and_then(Weak::upgrade)
    }
}

impl PeerFactory for LoopbackNetwork {
    fn create_peer(
        &self,
        _configuration: &PeerConfiguration,
    ) -> Result<Rc<dyn PeerConnection>, Box<dyn Error>> {
        if self.take_fault(LoopbackFault::CreatePeer) {
            return Err("loopback network refused to create a peer".into());
        }
        let id = self.0.next_id.get();
        self.0.next_id.set(id + 1);
        let network = self.clone();
        let peer = Rc::new_cyclic(|me| LoopbackPeer {
            id,
            me: me.clone(),
            network,
            state: RefCell::new(PeerState {
                signaling: SignalingState::Stable,
                ice: IceConnectionState::New,
                local: None,
                remote_id: None,
                sink: None,
                offered_channels: Vec::new(),
                channels: Vec::new(),
                linked: false,
                closed: false,
            }),
        });
        self.0.peers.borrow_mut().insert(id, Rc::downgrade(&peer));
        Ok(peer)
    }
}

impl Debug for LoopbackNetwork {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "loopback network with {} live peers", self.live_peer_count())
    }
}

struct PeerState {
    signaling: SignalingState,
    ice: IceConnectionState,
    local: Option<SessionDescription>,
    remote_id: Option<u64>,
    sink: Option<PeerEventSink>,
    /// Created locally and waiting for the other side
    offered_channels: Vec<Rc<LoopbackChannel>>,
    channels: Vec<Rc<LoopbackChannel>>,
    linked: bool,
    closed: bool,
}

pub struct LoopbackPeer {
    id: u64,
    me: Weak<LoopbackPeer>,
    network: LoopbackNetwork,
    state: RefCell<PeerState>,
}

impl LoopbackPeer {
    fn event_loop(&self) -> &EventLoop {
        &self.network.0.event_loop
    }

    fn notify(&self, event: PeerEvent) {
        let sink = self.state.borrow().sink.clone();
        if let Some(sink) = sink {
            sink(event);
        }
    }

    fn set_ice(&self, ice: IceConnectionState) {
        self.state.borrow_mut().ice = ice;
        self.notify(PeerEvent::IceConnectionState(ice));
    }

    fn check_open(&self) -> Result<(), Box<dyn Error>> {
        if self.state.borrow().closed {
            Err("peer connection is closed".into())
        } else {
            Ok(())
        }
    }

    fn describe_self(&self, kind: SdpKind) -> SessionDescription {
        SessionDescription::new(kind, &format!("{}{}", SDP_PREFIX, self.id))
    }

    fn apply_local(&self, description: SessionDescription) -> Result<(), Box<dyn Error>> {
        self.check_open()?;
        if self.network.take_fault(LoopbackFault::SetLocalDescription) {
            return Err("loopback refused the local description".into());
        }
        let mut state = self.state.borrow_mut();
        state.signaling = match (description.kind, state.signaling) {
            (SdpKind::Offer, SignalingState::Stable) => SignalingState::HaveLocalOffer,
            (SdpKind::Answer, SignalingState::HaveRemoteOffer) => SignalingState::Stable,
            (kind, signaling) => {
                return Err(format!("cannot set local {:?} in state {}", kind, signaling).into())
            }
        };
        state.local = Some(description);
        Ok(())
    }

    fn apply_remote(&self, description: SessionDescription) -> Result<(), Box<dyn Error>> {
        self.check_open()?;
        if self.network.take_fault(LoopbackFault::SetRemoteDescription) {
            return Err("loopback refused the remote description".into());
        }
        let remote_id = description
            .sdp
            .strip_prefix(SDP_PREFIX)
            .and_then(|id| id.parse::<u64>().ok())
            .ok_or_else(|| format!("{:?} is not a loopback session description", description.sdp))?;
        let mut state = self.state.borrow_mut();
        state.signaling = match (description.kind, state.signaling) {
            (SdpKind::Offer, SignalingState::Stable) => SignalingState::HaveRemoteOffer,
            (SdpKind::Answer, SignalingState::HaveLocalOffer) => SignalingState::Stable,
            (kind, signaling) => {
                return Err(format!("cannot set remote {:?} in state {}", kind, signaling).into())
            }
        };
        state.remote_id = Some(remote_id);
        Ok(())
    }

    /// Reports one host candidate and then the end of gathering, each on its own tick
    fn start_gathering(&self) {
        if self.network.take_fault(LoopbackFault::SilentGathering) {
            return;
        }
        if self.network.take_fault(LoopbackFault::IceFailure) {
            let me = self.me.clone();
            self.event_loop().defer(move || {
                if let Some(peer) = me.upgrade() {
                    peer.set_ice(IceConnectionState::Failed);
                }
            });
            return;
        }
        let candidate = IceCandidate {
            candidate: format!("candidate:{} 1 udp 1 127.0.0.1 {} typ host", self.id, self.id),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
        };
        for event in vec![Some(candidate), None] {
            let me = self.me.clone();
            self.event_loop().defer(move || {
                if let Some(peer) = me.upgrade() {
                    if peer.state.borrow().ice == IceConnectionState::New {
                        peer.state.borrow_mut().ice = IceConnectionState::Checking;
                    }
                    peer.notify(PeerEvent::IceCandidate(event));
                }
            });
        }
    }

    /// Links this peer with its counterpart once both have settled on each other
    fn try_connect(&self) {
        let (remote_id, is_offerer) = {
            let state = self.state.borrow();
            if state.linked || state.closed || state.signaling != SignalingState::Stable {
                return;
            }
            match (state.remote_id, &state.local) {
                (Some(remote_id), Some(local)) => (remote_id, local.kind == SdpKind::Offer),
                _ => return,
            }
        };
        let (me, remote) = match (self.me.upgrade(), self.network.peer(remote_id)) {
            (Some(me), Some(remote)) => (me, remote),
            _ => return,
        };
        {
            let state = remote.state.borrow();
            if state.linked
                || state.closed
                || state.signaling != SignalingState::Stable
                || state.remote_id != Some(self.id)
                || state.local.is_none()
            {
                return;
            }
        }
        let (offerer, answerer) = if is_offerer { (me, remote) } else { (remote, me) };
        offerer.state.borrow_mut().linked = true;
        answerer.state.borrow_mut().linked = true;
        let offered = std::mem::take(&mut offerer.state.borrow_mut().offered_channels);
        let mut pairs = Vec::new();
        for channel in offered {
            let twin = LoopbackChannel::new(&channel.label, self.event_loop());
            LoopbackChannel::pair(&channel, &twin);
            answerer.state.borrow_mut().channels.push(twin.clone());
            answerer.notify(PeerEvent::DataChannel(twin.clone()));
            pairs.push((channel, twin));
        }
        offerer.set_ice(IceConnectionState::Connected);
        answerer.set_ice(IceConnectionState::Connected);
        trace!("loopback peers {} and {} linked", offerer.id, answerer.id);
        self.event_loop().defer(move || {
            for (channel, twin) in pairs {
                channel.open();
                twin.open();
            }
        });
    }
}

impl PeerConnection for LoopbackPeer {
    fn set_event_sink(&self, sink: Option<PeerEventSink>) {
        self.state.borrow_mut().sink = sink;
    }

    fn create_offer(&self, _options: &OfferOptions, done: DescriptionCallback) {
        let me = self.me.clone();
        self.event_loop().defer(move || {
            let result = match me.upgrade() {
                Some(peer) => peer.check_open().and_then(|_| {
                    if peer.network.take_fault(LoopbackFault::CreateOffer) {
                        Err("loopback refused to create an offer".into())
                    } else {
                        Ok(peer.describe_self(SdpKind::Offer))
                    }
                }),
                None => Err("peer connection is gone".into()),
            };
            done(result);
        });
    }

    fn create_answer(&self, _options: &OfferOptions, done: DescriptionCallback) {
        let me = self.me.clone();
        self.event_loop().defer(move || {
            let result = match me.upgrade() {
                Some(peer) => peer.check_open().and_then(|_| {
                    let signaling = peer.state.borrow().signaling;
                    if peer.network.take_fault(LoopbackFault::CreateAnswer) {
                        Err("loopback refused to create an answer".into())
                    } else if signaling != SignalingState::HaveRemoteOffer {
                        Err(format!("cannot create answer in state {}", signaling).into())
                    } else {
                        Ok(peer.describe_self(SdpKind::Answer))
                    }
                }),
                None => Err("peer connection is gone".into()),
            };
            done(result);
        });
    }

    fn set_local_description(&self, description: SessionDescription, done: DoneCallback) {
        let me = self.me.clone();
        self.event_loop().defer(move || {
            let peer = match me.upgrade() {
                Some(peer) => peer,
                None => return done(Err("peer connection is gone".into())),
            };
            match peer.apply_local(description) {
                Ok(()) => {
                    done(Ok(()));
                    peer.start_gathering();
                    peer.try_connect();
                }
                Err(e) => done(Err(e)),
            }
        });
    }

    fn set_remote_description(&self, description: SessionDescription, done: DoneCallback) {
        let me = self.me.clone();
        self.event_loop().defer(move || {
            let peer = match me.upgrade() {
                Some(peer) => peer,
                None => return done(Err("peer connection is gone".into())),
            };
            match peer.apply_remote(description) {
                Ok(()) => {
                    done(Ok(()));
                    peer.try_connect();
                }
                Err(e) => done(Err(e)),
            }
        });
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.state.borrow().local.clone()
    }

    fn signaling_state(&self) -> SignalingState {
        self.state.borrow().signaling
    }

    fn ice_connection_state(&self) -> IceConnectionState {
        self.state.borrow().ice
    }

    fn create_data_channel(&self, label: &str) -> Result<Rc<dyn DataChannel>, Box<dyn Error>> {
        self.check_open()?;
        let channel = LoopbackChannel::new(label, self.event_loop());
        let mut state = self.state.borrow_mut();
        state.offered_channels.push(channel.clone());
        state.channels.push(channel.clone());
        Ok(channel)
    }

    fn close(&self) {
        let channels = {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return;
            }
            state.closed = true;
            state.signaling = SignalingState::Closed;
            state.ice = IceConnectionState::Closed;
            state.sink = None;
            state.offered_channels.clear();
            std::mem::take(&mut state.channels)
        };
        for channel in channels {
            channel.close();
        }
        self.network.0.peers.borrow_mut().remove(&self.id);
    }
}

struct ChannelState {
    sink: Option<ChannelEventSink>,
    open: bool,
    closed: bool,
    counterpart: Weak<LoopbackChannel>,
}

pub struct LoopbackChannel {
    label: String,
    event_loop: EventLoop,
    me: Weak<LoopbackChannel>,
    state: RefCell<ChannelState>,
}

impl LoopbackChannel {
    fn new(label: &str, event_loop: &EventLoop) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            label: label.to_string(),
            event_loop: event_loop.clone(),
            me: me.clone(),
            state: RefCell::new(ChannelState {
                sink: None,
                open: false,
                closed: false,
                counterpart: Weak::new(),
            }),
        })
    }

    fn pair(a: &Rc<Self>, b: &Rc<Self>) {
        a.state.borrow_mut().counterpart = Rc::downgrade(b);
        b.state.borrow_mut().counterpart = Rc::downgrade(a);
    }

    fn notify(&self, event: ChannelEvent) {
        let sink = self.state.borrow().sink.clone();
        if let Some(sink) = sink {
            sink(event);
        }
    }

    fn open(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.closed || state.open {
                return;
            }
            state.open = true;
        }
        self.notify(ChannelEvent::Open);
    }

    fn deliver(&self, text: String) {
        if self.state.borrow().open {
            self.notify(ChannelEvent::Message(text));
        }
    }
}

impl DataChannel for LoopbackChannel {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn set_event_sink(&self, sink: Option<ChannelEventSink>) {
        self.state.borrow_mut().sink = sink;
    }

    fn is_open(&self) -> bool {
        self.state.borrow().open
    }

    fn send(&self, text: &str) -> Result<(), Box<dyn Error>> {
        let counterpart = {
            let state = self.state.borrow();
            if !state.open {
                return Err(format!("data channel {:?} is not open", self.label).into());
            }
            state.counterpart.clone()
        };
        let text = text.to_string();
        self.event_loop.defer(move || {
            if let Some(counterpart) = counterpart.upgrade() {
                counterpart.deliver(text);
            }
        });
        Ok(())
    }

    fn close(&self) {
        let counterpart = {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return;
            }
            state.closed = true;
            state.open = false;
            std::mem::take(&mut state.counterpart)
        };
        let me = self.me.clone();
        self.event_loop.defer(move || {
            if let Some(channel) = me.upgrade() {
                channel.notify(ChannelEvent::Close);
            }
        });
        if let Some(counterpart) = counterpart.upgrade() {
            counterpart.close();
        }
    }
}
