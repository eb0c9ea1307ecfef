use super::*;

/// The "error" of an answer envelope, None when it is missing or null
pub(crate) fn answer_error(message: &Value) -> Option<String> {
    match message.get("error") {
        None | Some(Value::Null) => None,
        Some(Value::String(error)) => Some(error.clone()),
        Some(error) => Some(error.to_string()),
    }
}

#[derive(Default)]
struct SignalingLink {
    pipe: Option<Pipe>,
    listeners: Vec<(&'static str, Listener)>,
}

/// State shared by creators and joiners
pub(crate) struct ActorCore {
    pub role: Role,
    pub config: ActorConfig,
    pub context: RtcContext,
    pub events: EventDispatcher,
    pub link: RefCell<PeerLink>,
    signaling: RefCell<SignalingLink>,
    pub was_impersonated: Cell<bool>,
    pub is_disposed: Cell<bool>,
}

impl ActorCore {
    pub fn new(role: Role, context: &RtcContext, config: &ActorConfig) -> Self {
        let config = config.resolve(&context.settings);
        let link = PeerLink::new(config.id_rtc_participant.as_deref());
        Self {
            role,
            config,
            context: context.clone(),
            events: EventDispatcher::new(),
            link: RefCell::new(link),
            signaling: RefCell::new(SignalingLink::default()),
            was_impersonated: Cell::new(false),
            is_disposed: Cell::new(false),
        }
    }

    pub fn signaling_pipe(&self) -> Option<Pipe> {
        self.signaling.borrow().pipe.clone()
    }

    pub fn describe(&self, disposed: bool) -> String {
        let kind = match self.role {
            Role::Creator => "rtc-creator",
            Role::Joiner => "rtc-joiner",
        };
        self.link.borrow().describe(kind, disposed, &[])
    }

    /// Sends a call over the signaling pipe
    pub fn call(&self, message: Envelope) -> Result<(), Box<dyn Error>> {
        let pipe = self
            .signaling_pipe()
            .ok_or("no connection to signaling server")?;
        trace!("{} signaling out {:?}", self.describe(false), message);
        pipe.send(message)
    }
}

/// A creator or a joiner: a participant that reaches the other side through a signaling
/// server
pub(crate) trait Actor: Participant + Sized {
    fn core(&self) -> &ActorCore;
    fn on_impersonation_complete(&self);
    /// Returns false if this role has nothing to do with the method
    fn on_role_message(&self, method: &str, message: &Value) -> bool;
}

/// Connects to the signaling server. Impersonation starts once the pipe opens.
pub(crate) fn open_signaling<A: Actor>(actor: &Rc<A>) -> Result<(), Box<dyn Error>> {
    close_signaling(actor.as_ref());
    let core = actor.core();
    let url = core.config.signaling_url.clone();
    let pipe = (core.context.connect_signaling)(&url)?;
    debug!("{} connecting to signaling server {}", actor.describe(), url);
    let on_open = {
        let actor = Rc::downgrade(actor);
        listener(move |_| {
            if let Some(actor) = actor.upgrade() {
                on_signaling_open(actor.as_ref());
            }
        })
    };
    let on_close = {
        let actor = Rc::downgrade(actor);
        listener(move |_| {
            if let Some(actor) = actor.upgrade() {
                actor.emit(Event::new("signalingPipeClose"));
                close_signaling(actor.as_ref());
            }
        })
    };
    let on_error = {
        let actor = Rc::downgrade(actor);
        listener(move |event| {
            if let Some(actor) = actor.upgrade() {
                let error = event.str_field("message").unwrap_or("signaling pipe error");
                actor.emit(Event::new("signalingPipeError").with("error", error));
                actor.on_error(error);
                close_signaling(actor.as_ref());
            }
        })
    };
    let on_message = {
        let actor = Rc::downgrade(actor);
        listener(move |event| {
            if let (Some(actor), Some(message)) = (actor.upgrade(), event.field("message")) {
                on_signaling_message(actor.as_ref(), message);
            }
        })
    };
    let listeners = vec![
        ("open", on_open),
        ("close", on_close),
        ("error", on_error),
        ("message", on_message),
    ];
    for (kind, listener) in &listeners {
        pipe.on(kind, listener);
    }
    *core.signaling.borrow_mut() = SignalingLink {
        pipe: Some(pipe),
        listeners,
    };
    Ok(())
}

/// Drops the signaling pipe, if any, and emits "signalingClosed"
pub(crate) fn close_signaling<A: Actor>(actor: &A) {
    let link = std::mem::take(&mut *actor.core().signaling.borrow_mut());
    if let Some(pipe) = link.pipe {
        for (kind, listener) in &link.listeners {
            pipe.off(kind, Some(listener));
        }
        pipe.disconnect();
        debug!("{} closed its signaling pipe", actor.describe());
        actor.emit(Event::new("signalingClosed"));
    }
}

fn on_signaling_open<A: Actor>(actor: &A) {
    actor.emit(Event::new("signalingPipeOpen"));
    let core = actor.core();
    let mut message = new_call("signalingImpersonate");
    message.insert("idCategory".to_string(), json!(core.config.id_category));
    message.insert("idSpace".to_string(), json!(core.config.id_space));
    message.insert("idRtcParticipant".to_string(), json!(actor.participant_id()));
    message.insert("role".to_string(), json!(core.role.as_str()));
    if let Err(e) = core.call(message) {
        actor.on_error(&format!("Failed to send impersonation: {}", e));
    }
}

fn on_signaling_message<A: Actor>(actor: &A, message: &Value) {
    if actor.is_disposed() {
        return;
    }
    trace!("{} signaling in {}", actor.describe(), message);
    let method = message.get("method").and_then(Value::as_str).unwrap_or("");
    if method == "signalingImpersonate" {
        match answer_error(message) {
            None => {
                debug!("{} impersonated on signaling server", actor.describe());
                actor.core().was_impersonated.set(true);
                actor.emit(Event::new("signalingPassedImpersonation"));
                actor.on_impersonation_complete();
            }
            Some(error) => {
                actor.emit(Event::new("signalingFailedImpersonation").with("error", error.as_str()));
                actor.on_error(&error);
            }
        }
    } else if !actor.on_role_message(method, message) {
        warn!("{} unhandled signaling message {}", actor.describe(), message);
    }
}
