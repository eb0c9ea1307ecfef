use super::*;

/// The WebRTC resources of one participant
pub(crate) struct PeerLink {
    pub id: String,
    pub was_identified: bool,
    pub ice_complete: bool,
    pub pc: Option<Rc<dyn PeerConnection>>,
    pub dc: Option<Rc<dyn DataChannel>>,
}

impl PeerLink {
    /// A blank id gets a random UUID
    pub fn new(id: Option<&str>) -> Self {
        Self {
            id: id
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .unwrap_or_else(random_uuid),
            was_identified: false,
            ice_complete: false,
            pc: None,
            dc: None,
        }
    }

    /// "<kind> <id>(flags)", flags being disposed, identified, pc and dc as they apply
    pub fn describe(&self, kind: &str, disposed: bool, extra: &[String]) -> String {
        let mut flags: Vec<String> = Vec::new();
        if disposed {
            flags.push("disposed".to_string());
        }
        if self.was_identified {
            flags.push("identified".to_string());
        }
        if self.pc.is_some() {
            flags.push("pc".to_string());
        }
        if self.dc.is_some() {
            flags.push("dc".to_string());
        }
        flags.extend(extra.iter().cloned());
        let mut description = format!("{} {}", kind, self.id);
        if !flags.is_empty() {
            description += &format!("({})", flags.join(", "));
        }
        description
    }
}

/// Whatever owns a PeerLink: server peers, creators and joiners
pub(crate) trait Participant: 'static {
    fn link(&self) -> &RefCell<PeerLink>;
    fn is_disposed(&self) -> bool;
    fn describe(&self) -> String;
    /// Dispatches the event with the participant's public handle attached
    fn emit(&self, event: Event);
    fn on_error(&self, reason: &str);
    fn on_ice_candidate(&self, candidate: Option<IceCandidate>);

    /// A data channel opened by the other side
    fn on_remote_channel(&self, channel: Rc<dyn DataChannel>) {
        debug!("{} refused remote data channel {:?}", self.describe(), channel.label());
        channel.close();
    }

    fn participant_id(&self) -> String {
        self.link().borrow().id.clone()
    }

    fn peer_connection(&self) -> Option<Rc<dyn PeerConnection>> {
        self.link().borrow().pc.clone()
    }
}

pub(crate) fn close_data_channel<P: Participant + ?Sized>(participant: &P) {
    let dc = participant.link().borrow_mut().dc.take();
    if let Some(dc) = dc {
        dc.set_event_sink(None);
        dc.close();
        trace!("{} closed its data channel", participant.describe());
        participant.emit(Event::new("dataChannelClose"));
    }
}

pub(crate) fn close_peer<P: Participant + ?Sized>(participant: &P) {
    let pc = participant.link().borrow_mut().pc.take();
    if let Some(pc) = pc {
        pc.set_event_sink(None);
        pc.close();
        trace!("{} closed its peer connection", participant.describe());
        participant.emit(Event::new("peerClose"));
    }
}

/// Tears down the channel and the connection, then reports the reason as
/// "rtcParticipantError". Nothing half-open is left behind once listeners hear about it.
pub(crate) fn fail<P: Participant + ?Sized>(participant: &P, reason: &str) {
    warn!("{} error: {}", participant.describe(), reason);
    close_data_channel(participant);
    close_peer(participant);
    participant.emit(Event::new("rtcParticipantError").with("error", reason));
}

/// Sends over the data channel. Failures are reported through on_error as well as returned.
pub(crate) fn send_text<P: Participant + ?Sized>(
    participant: &P,
    text: &str,
) -> Result<(), Box<dyn Error>> {
    let dc = participant.link().borrow().dc.clone();
    let reason = match dc {
        None => format!(
            "Attempt to send message to uninitialized RTC data channel: {}",
            text
        ),
        Some(dc) => match dc.send(text) {
            Ok(()) => return Ok(()),
            Err(e) => format!("Failed to send message to RTC data channel: {}", e),
        },
    };
    participant.on_error(&reason);
    Err(reason.into())
}

/// Routes what a peer connection reports back to its participant
pub(crate) fn peer_sink<P: Participant>(participant: Weak<P>) -> PeerEventSink {
    Rc::new(move |event: PeerEvent| {
        let participant = match participant.upgrade() {
            Some(participant) if !participant.is_disposed() => participant,
            _ => return,
        };
        match event {
            PeerEvent::IceCandidate(candidate) => {
                participant.link().borrow_mut().ice_complete = true;
                participant.on_ice_candidate(candidate);
            }
            PeerEvent::IceConnectionState(state) => {
                trace!(
                    "{} ICE connection state changed to {}",
                    participant.describe(),
                    state
                );
                if state.is_failure() {
                    participant.on_error(&format!("ICE connection state changed to {}", state));
                }
            }
            PeerEvent::DataChannel(channel) => participant.on_remote_channel(channel),
        }
    })
}

/// Turns data channel activity into dataChannelOpen, dataChannelMessage (field "data" holds
/// the text), dataChannelClose and dataChannelError events
pub(crate) fn watch_channel<P: Participant>(participant: Weak<P>, channel: &Rc<dyn DataChannel>) {
    channel.set_event_sink(Some(Rc::new(move |event: ChannelEvent| {
        let participant = match participant.upgrade() {
            Some(participant) if !participant.is_disposed() => participant,
            _ => return,
        };
        match event {
            ChannelEvent::Open => participant.emit(Event::new("dataChannelOpen")),
            ChannelEvent::Message(text) => {
                // STX marks keep-alive chatter from some browsers
                if text.starts_with('\u{2}') {
                    return;
                }
                participant.emit(Event::new("dataChannelMessage").with("data", text));
            }
            ChannelEvent::Close => participant.emit(Event::new("dataChannelClose")),
            ChannelEvent::Error(error) => {
                participant.emit(Event::new("dataChannelError").with("error", error.as_str()));
                participant.on_error(&format!("Data channel error {}", error));
            }
        }
    })));
}
