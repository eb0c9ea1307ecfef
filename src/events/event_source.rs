use super::*;

/// Anything that owns an EventDispatcher and lets others subscribe to it
pub trait EventSource {
    fn dispatcher(&self) -> &EventDispatcher;

    fn on(&self, kind: &str, listener: &Listener) {
        self.dispatcher().on(kind, listener);
    }

    fn off(&self, kind: &str, listener: Option<&Listener>) {
        self.dispatcher().off(kind, listener);
    }

    fn off_all(&self) {
        self.dispatcher().off_all();
    }

    /// Registers a closure and returns the listener handle so it can be removed later
    fn listen<F: Fn(&Event) + 'static>(&self, kind: &str, f: F) -> Listener
    where
        Self: Sized,
    {
        let listener = listener(f);
        self.on(kind, &listener);
        listener
    }
}
