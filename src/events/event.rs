use super::*;

/// Something that happened, handed to every listener registered for its kind. Fields are plain
/// JSON so they can be forwarded as-is; attachments carry live objects (the pipe a message came
/// from, the peer that failed, etc).
#[derive(Clone)]
pub struct Event {
    kind: String,
    fields: Map<String, Value>,
    attachments: Vec<Rc<dyn Any>>,
}

impl Event {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            fields: Map::new(),
            attachments: Vec::new(),
        }
    }

    pub fn with<V: Into<Value>>(mut self, key: &str, value: V) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Attach a live object. Only the first attachment of a given type can be retrieved.
    pub fn attach<T: Any>(mut self, value: T) -> Self {
        self.attachments.push(Rc::new(value));
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.attachments
            .iter()
            .find_map(|attachment| attachment.downcast_ref::<T>())
    }
}

impl Debug for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event {} {}", self.kind, Value::Object(self.fields.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_kind_and_fields() {
        let event = Event::new("message").with("message", json!({"id": "a"}));
        assert_eq!(event.kind(), "message");
        assert_eq!(event.field("message"), Some(&json!({"id": "a"})));
        assert_eq!(event.field("nope"), None);
    }

    #[test]
    fn reads_string_fields() {
        let event = Event::new("error").with("message", "broken");
        assert_eq!(event.str_field("message"), Some("broken"));
    }

    #[test]
    fn retrieves_attachment_by_type() {
        let event = Event::new("connection").attach(7u32).attach("text".to_string());
        assert_eq!(event.get::<u32>(), Some(&7));
        assert_eq!(event.get::<String>().map(String::as_str), Some("text"));
        assert!(event.get::<i64>().is_none());
    }

    #[test]
    fn debug_shows_kind_and_fields() {
        let event = Event::new("close").with("code", 3);
        assert_eq!(format!("{:?}", event), "Event close {\"code\":3}");
    }
}
