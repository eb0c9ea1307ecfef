use super::*;

/// Listens for the given event kinds and keeps everything it sees, in order
pub struct RecordedEvents {
    events: Rc<RefCell<Vec<Event>>>,
}

impl RecordedEvents {
    pub fn new<S: EventSource>(source: &S, kinds: &[&str]) -> Self {
        let events = Rc::new(RefCell::new(Vec::new()));
        let recorder = {
            let events = events.clone();
            listener(move |event: &Event| events.borrow_mut().push(event.clone()))
        };
        for kind in kinds {
            source.on(kind, &recorder);
        }
        Self { events }
    }

    pub fn kinds(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .map(|event| event.kind().to_string())
            .collect()
    }

    pub fn assert_kinds(&self, expected: &[&str]) {
        assert_eq!(self.kinds(), expected);
    }

    pub fn count(&self, kind: &str) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn get(&self, index: usize) -> Event {
        self.events.borrow()[index].clone()
    }

    pub fn last(&self) -> Option<Event> {
        self.events.borrow().last().cloned()
    }

    /// A field of the index-th recorded event, null if absent
    pub fn field(&self, index: usize, key: &str) -> Value {
        self.get(index).field(key).cloned().unwrap_or(Value::Null)
    }

    /// The given field of every recorded event that has it
    pub fn fields(&self, key: &str) -> Vec<Value> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| event.field(key).cloned())
            .collect()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}
