use super::*;

/// Loopback transport: whatever one end transmits the other end receives, synchronously
pub struct DirectTransport {
    counterpart: RefCell<WeakPipe>,
}

impl DirectTransport {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            counterpart: RefCell::new(WeakPipe::default()),
        })
    }
}

impl Transport for DirectTransport {
    fn transmit(&self, _: &Pipe, text: String) -> Result<(), Box<dyn Error>> {
        let counterpart = self.counterpart.borrow().upgrade();
        match counterpart {
            Some(counterpart) if counterpart.is_connected() => {
                counterpart.receive(Payload::Text(text));
                Ok(())
            }
            _ => Err(PipeError::CounterpartDisconnected.into()),
        }
    }

    fn teardown(&self, _: &Pipe) {
        let counterpart = self.counterpart.replace(WeakPipe::default()).upgrade();
        if let Some(counterpart) = counterpart {
            counterpart.disconnect();
        }
    }
}

/// Two connected pipes wired to each other. Disconnecting either disconnects both.
pub(crate) fn linked_pair(
    kind: TransportKind,
    urls: (&str, &str),
    subtypes: (PipeSubtype, PipeSubtype),
    settings: &PipeSettings,
) -> (Pipe, Pipe) {
    let first_transport = DirectTransport::new();
    let second_transport = DirectTransport::new();
    let first = Pipe::new(kind, subtypes.0, urls.0, settings, first_transport.clone());
    let second = Pipe::new(kind, subtypes.1, urls.1, settings, second_transport.clone());
    *first_transport.counterpart.borrow_mut() = second.downgrade();
    *second_transport.counterpart.borrow_mut() = first.downgrade();
    first.mark_connected();
    second.mark_connected();
    (first, second)
}

/// A connected direct pair. If an event loop is given "open" is emitted on both ends on its
/// next tick.
pub fn direct_pair(settings: &PipeSettings, announce_on: Option<&EventLoop>) -> (Pipe, Pipe) {
    let id = random_call_id();
    let (first, second) = linked_pair(
        TransportKind::Direct,
        (
            &format!("direct_pipe://1-{}:1", id),
            &format!("direct_pipe://2-{}:2", id),
        ),
        (PipeSubtype::Loopback, PipeSubtype::Loopback),
        settings,
    );
    if let Some(event_loop) = announce_on {
        let pipes = (first.downgrade(), second.downgrade());
        event_loop.defer(move || {
            for pipe in [&pipes.0, &pipes.1].iter().filter_map(|p| p.upgrade()) {
                if pipe.is_connected() {
                    pipe.emit_open();
                }
            }
        });
    }
    (first, second)
}
