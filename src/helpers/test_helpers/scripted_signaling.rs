use super::*;

type Completion<T> = Box<dyn FnOnce(Result<T, Box<dyn Error>>)>;
type Replier = Rc<dyn Fn(&Value) -> Vec<Value>>;

/// Starts an async provider call and runs the loop until its callback fired
pub fn complete<T: 'static, F: FnOnce(Completion<T>)>(
    event_loop: &EventLoop,
    start: F,
) -> Result<T, Box<dyn Error>> {
    let result = Rc::new(RefCell::new(None));
    let result_clone = result.clone();
    start(Box::new(move |r: Result<T, Box<dyn Error>>| {
        *result_clone.borrow_mut() = Some(r)
    }));
    event_loop.run_ready();
    let result = result.borrow_mut().take();
    result.expect("callback did not run")
}

/// Accepts every call with a null error
pub fn accept_everything(request: &Value) -> Vec<Value> {
    vec![Value::Object(prepare_answer(request))]
}

/// A fake signaling server. Every connection is a direct pair; requests are recorded and the
/// reply function's answers are sent back on the next tick.
pub struct ScriptedSignaling {
    pub event_loop: EventLoop,
    pub network: LoopbackNetwork,
    connections: Rc<RefCell<Vec<Pipe>>>,
    requests: Rc<RefCell<Vec<Value>>>,
    replier: Rc<RefCell<Option<Replier>>>,
}

impl ScriptedSignaling {
    pub fn new() -> Self {
        let event_loop = EventLoop::new_manual();
        let network = LoopbackNetwork::new(&event_loop);
        Self {
            event_loop,
            network,
            connections: Rc::new(RefCell::new(Vec::new())),
            requests: Rc::new(RefCell::new(Vec::new())),
            replier: Rc::new(RefCell::new(None)),
        }
    }

    pub fn reply_with<F: Fn(&Value) -> Vec<Value> + 'static>(&self, replier: F) {
        *self.replier.borrow_mut() = Some(Rc::new(replier));
    }

    pub fn connector(&self) -> SignalingConnector {
        let event_loop = self.event_loop.clone();
        let connections = self.connections.clone();
        let requests = self.requests.clone();
        let replier = self.replier.clone();
        Rc::new(move |_url: &str| {
            let (client, server) = direct_pair(&PipeSettings::default(), Some(&event_loop));
            {
                let event_loop = event_loop.clone();
                let requests = requests.clone();
                let replier = replier.clone();
                let weak_server = server.downgrade();
                server.listen("message", move |event: &Event| {
                    let request = match event.field("message") {
                        Some(request) => request.clone(),
                        None => return,
                    };
                    requests.borrow_mut().push(request.clone());
                    let replies = match replier.borrow().clone() {
                        Some(replier) => replier(&request),
                        None => return,
                    };
                    let server = weak_server.clone();
                    event_loop.defer(move || {
                        if let Some(server) = server.upgrade() {
                            for reply in replies {
                                server.send(reply).unwrap();
                            }
                        }
                    });
                });
            }
            connections.borrow_mut().push(server);
            Ok(client)
        })
    }

    pub fn context(&self) -> RtcContext {
        RtcContext::new(&self.event_loop, Rc::new(self.network.clone()), self.connector())
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.borrow().clone()
    }

    pub fn requests_for(&self, method: &str) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|request| request["method"] == json!(method))
            .collect()
    }

    /// The server end of the index-th connection
    pub fn connection(&self, index: usize) -> Pipe {
        self.connections.borrow()[index].clone()
    }

    /// Sends an unsolicited message down a connection and lets everything settle
    pub fn push(&self, index: usize, message: Value) {
        self.connection(index).send(message).unwrap();
        self.event_loop.run_ready();
    }
}

/// The browser side of a negotiation driven by hand
pub struct AnsweringPeer {
    pub pc: Rc<dyn PeerConnection>,
    channel: Rc<RefCell<Option<Rc<dyn DataChannel>>>>,
    received: Rc<RefCell<Vec<String>>>,
}

impl AnsweringPeer {
    pub fn channel(&self) -> Option<Rc<dyn DataChannel>> {
        self.channel.borrow().clone()
    }

    /// Text that arrived on the channel
    pub fn received(&self) -> Rc<RefCell<Vec<String>>> {
        self.received.clone()
    }
}

fn recording_sink(received: &Rc<RefCell<Vec<String>>>) -> ChannelEventSink {
    let received = received.clone();
    Rc::new(move |event: ChannelEvent| {
        if let ChannelEvent::Message(text) = event {
            received.borrow_mut().push(text);
        }
    })
}

/// Answers the most recently published offer and pushes the answer to the creator on the given
/// connection, the way the signaling server relays it
pub fn answer_offer(signaling: &ScriptedSignaling, connection: usize, joiner_id: &str) -> AnsweringPeer {
    let published = signaling.requests_for("signalingPublishOffer");
    let request = published.last().expect("no offer was published").clone();
    let offer = SessionDescription::from_value(&request["offer"]).unwrap();
    let pc = signaling
        .network
        .create_peer(&PeerConfiguration::default())
        .unwrap();
    let channel = Rc::new(RefCell::new(None));
    let received = Rc::new(RefCell::new(Vec::new()));
    {
        let channel = channel.clone();
        let received = received.clone();
        pc.set_event_sink(Some(Rc::new(move |event: PeerEvent| {
            if let PeerEvent::DataChannel(dc) = event {
                dc.set_event_sink(Some(recording_sink(&received)));
                *channel.borrow_mut() = Some(dc);
            }
        })));
    }
    let event_loop = &signaling.event_loop;
    complete(event_loop, |done| pc.set_remote_description(offer, done)).unwrap();
    let answer = complete(event_loop, |done| pc.create_answer(&OfferOptions::default(), done)).unwrap();
    complete(event_loop, |done| pc.set_local_description(answer.clone(), done)).unwrap();
    signaling.push(
        connection,
        json!({
            "id": random_call_id(),
            "method": "signalingPublishAnswer",
            "error": null,
            "answer": answer.to_value(),
            "idSomebody_joiner": joiner_id,
            "idOffer": request["idOffer"],
        }),
    );
    AnsweringPeer {
        pc,
        channel,
        received,
    }
}

/// The creator side of a negotiation driven by hand: a peer with a data channel and an offer
/// already set locally
pub struct OfferingPeer {
    pub pc: Rc<dyn PeerConnection>,
    pub channel: Rc<dyn DataChannel>,
    pub offer: SessionDescription,
    pub received: Rc<RefCell<Vec<String>>>,
    event_loop: EventLoop,
}

impl OfferingPeer {
    pub fn new(signaling: &ScriptedSignaling) -> Self {
        let event_loop = signaling.event_loop.clone();
        let pc = signaling
            .network
            .create_peer(&PeerConfiguration::default())
            .unwrap();
        let channel = pc.create_data_channel("genericDataChannel").unwrap();
        let received = Rc::new(RefCell::new(Vec::new()));
        channel.set_event_sink(Some(recording_sink(&received)));
        let offer = complete(&event_loop, |done| pc.create_offer(&OfferOptions::default(), done)).unwrap();
        complete(&event_loop, |done| pc.set_local_description(offer.clone(), done)).unwrap();
        Self {
            pc,
            channel,
            offer,
            received,
            event_loop,
        }
    }

    /// A reply function that hands this offer to whoever fetches one and accepts everything
    /// else
    pub fn fetch_reply(&self, id_somebody_creator: &str, id_offer: u64) -> impl Fn(&Value) -> Vec<Value> + 'static {
        let offer = self.offer.to_value();
        let id_somebody_creator = id_somebody_creator.to_string();
        move |request: &Value| {
            let mut answer = prepare_answer(request);
            if request["method"] == json!("signalingFetchOffer") {
                answer.insert("offer".to_string(), offer.clone());
                answer.insert("idSomebodyCreator".to_string(), json!(id_somebody_creator));
                answer.insert("idOffer".to_string(), json!(id_offer));
            }
            vec![Value::Object(answer)]
        }
    }

    /// Applies the answer from a signalingPublishAnswer request
    pub fn accept(&self, request: &Value) {
        let answer = SessionDescription::from_value(&request["answer"]).unwrap();
        complete(&self.event_loop, |done| self.pc.set_remote_description(answer, done)).unwrap();
    }
}
