use super::*;

/// Shared handle to an event callback. Listener identity is the identity of this handle, so keep
/// a clone around if you need to `off()` it later.
pub type Listener = Rc<dyn Fn(&Event)>;

pub fn listener<F: Fn(&Event) + 'static>(f: F) -> Listener {
    Rc::new(f)
}

/// Ordered (kind, listener) registry. Dispatch works on a snapshot, so listeners may add or remove
/// listeners (themselves included) while being called.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RefCell<Vec<(String, Listener)>>,
    is_disposed: Cell<bool>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the listener unless the exact (kind, listener) pair is already registered
    pub fn on(&self, kind: &str, listener: &Listener) {
        if self.has_listener(kind, listener) {
            return;
        }
        self.listeners
            .borrow_mut()
            .push((kind.to_string(), listener.clone()));
    }

    /// Removes the given listener from the kind, or every listener of the kind if None
    pub fn off(&self, kind: &str, listener: Option<&Listener>) {
        self.listeners
            .borrow_mut()
            .retain(|(registered_kind, registered)| {
                registered_kind != kind
                    || listener.map_or(false, |l| l.thin_ptr() != registered.thin_ptr())
            });
    }

    pub fn off_all(&self) {
        self.listeners.borrow_mut().clear();
    }

    pub fn has_listener(&self, kind: &str, listener: &Listener) -> bool {
        self.listeners
            .borrow()
            .iter()
            .any(|(k, l)| k == kind && l.thin_ptr() == listener.thin_ptr())
    }

    pub fn listener_count(&self, kind: &str) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|(k, _)| k == kind)
            .count()
    }

    pub fn dispatch(&self, event: &Event) {
        let snapshot: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(kind, _)| kind == event.kind())
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    /// Emits "dispose" and drops every listener. Returns false (and does nothing) if already
    /// disposed.
    pub fn dispose(&self) -> bool {
        if self.is_disposed.replace(true) {
            return false;
        }
        self.dispatch(&Event::new("dispose"));
        self.off_all();
        true
    }

    pub fn is_disposed(&self) -> bool {
        self.is_disposed.get()
    }
}

impl Debug for EventDispatcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EventDispatcher with {} listeners",
            self.listeners.borrow().len()
        )
    }
}
