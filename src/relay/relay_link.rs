use super::*;

/// Whether a forwarded message is flushed right away, per direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoFlush {
    /// incoming → outgoing
    pub incoming: bool,
    /// outgoing → incoming
    pub outgoing: bool,
}

pub struct RelayCore {
    events: EventDispatcher,
    name: String,
}

impl RelayCore {
    pub fn new(name: &str) -> Rc<Self> {
        Rc::new(Self {
            events: EventDispatcher::new(),
            name: if name.is_empty() {
                "unnamed".to_string()
            } else {
                name.to_string()
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Dispatches an event about the pair whose incoming side is given
    pub fn emit(&self, event: Event, incoming: &Pipe, is_external: bool) {
        let event = event
            .with("relayName", self.name.as_str())
            .with("remoteAddress", incoming.remote_address())
            .with("isExternalSocket", is_external)
            .attach(incoming.clone());
        self.events.dispatch(&event);
    }
}

struct Wiring {
    incoming: WeakPipe,
    outgoing: WeakPipe,
    listeners: Vec<(WeakPipe, &'static str, Listener)>,
}

/// Taken on the first close or error so the pair is torn down once
type SharedWiring = Rc<RefCell<Option<Wiring>>>;

fn teardown(wiring: &SharedWiring) {
    let wiring = match wiring.borrow_mut().take() {
        Some(wiring) => wiring,
        None => return,
    };
    for (pipe, kind, listener) in &wiring.listeners {
        if let Some(pipe) = pipe.upgrade() {
            pipe.off(kind, Some(listener));
        }
    }
    for pipe in &[wiring.outgoing, wiring.incoming] {
        if let Some(pipe) = pipe.upgrade() {
            pipe.disconnect();
            pipe.dispose();
        }
    }
}

/// Forwards messages both ways between the pipes and reports through the core
pub fn link_pipes(core: &Rc<RelayCore>, incoming: &Pipe, outgoing: &Pipe, auto_flush: AutoFlush) {
    let wiring: SharedWiring = Rc::new(RefCell::new(None));
    let mut listeners = Vec::new();
    let directions = [
        (incoming, outgoing, true, auto_flush.incoming),
        (outgoing, incoming, false, auto_flush.outgoing),
    ];
    for &(from, to, is_external, flush) in &directions {
        let on_message = {
            let core = Rc::downgrade(core);
            let incoming = incoming.downgrade();
            let to = to.downgrade();
            listener(move |event| {
                let message = event.field("message").cloned().unwrap_or(Value::Null);
                if let (Some(core), Some(incoming)) = (core.upgrade(), incoming.upgrade()) {
                    core.emit(
                        Event::new("message").with("message", message.clone()),
                        &incoming,
                        is_external,
                    );
                }
                match to.upgrade() {
                    Some(to) => to
                        .send_with(message, flush)
                        .or_log_warn("relaying message"),
                    None => warn!("relay target is gone, dropping message"),
                }
            })
        };
        let on_close = {
            let core = Rc::downgrade(core);
            let incoming = incoming.downgrade();
            let wiring = wiring.clone();
            listener(move |_| {
                if let (Some(core), Some(incoming)) = (core.upgrade(), incoming.upgrade()) {
                    debug!(
                        "relay {:?} {} side closed {:?}",
                        core.name(),
                        if is_external { "incoming" } else { "outgoing" },
                        incoming.remote_address()
                    );
                    core.emit(Event::new("close"), &incoming, is_external);
                }
                teardown(&wiring);
            })
        };
        let on_error = {
            let core = Rc::downgrade(core);
            let incoming = incoming.downgrade();
            let wiring = wiring.clone();
            listener(move |event| {
                let message = event.field("message").cloned().unwrap_or(Value::Null);
                if let (Some(core), Some(incoming)) = (core.upgrade(), incoming.upgrade()) {
                    warn!(
                        "relay {:?} {} side error: {}",
                        core.name(),
                        if is_external { "incoming" } else { "outgoing" },
                        message
                    );
                    core.emit(
                        Event::new("error").with("message", message),
                        &incoming,
                        is_external,
                    );
                }
                teardown(&wiring);
            })
        };
        for (kind, listener) in vec![("message", on_message), ("close", on_close), ("error", on_error)] {
            from.on(kind, &listener);
            listeners.push((from.downgrade(), kind, listener));
        }
    }
    *wiring.borrow_mut() = Some(Wiring {
        incoming: incoming.downgrade(),
        outgoing: outgoing.downgrade(),
        listeners,
    });
}
