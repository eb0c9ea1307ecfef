use super::*;

/// Key of the batch frame that wraps several envelopes flushed together
pub const BATCH_KEY: &str = "arr_packed_messages";
/// Older peers frame batches with this key, accepted when decoding only
const LEGACY_BATCH_KEY: &str = "arrPackedMessages";

/// One decoded request or response. Requests have at least "id" and "method", responses add
/// "error" (null on success) and their result fields.
pub type Envelope = Map<String, Value>;

/// Data handed to Pipe::send() or Pipe::receive()
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Already in wire form
    Text(String),
    Json(Value),
}

impl Payload {
    pub fn marshal(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Json(value) => value.to_string(),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Text(text) => unmarshal(&text),
            Self::Json(value) => value,
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Envelope> for Payload {
    fn from(envelope: Envelope) -> Self {
        Self::Json(Value::Object(envelope))
    }
}

/// Text that is not JSON is not an error, it becomes an envelope describing the problem
pub fn unmarshal(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|e| {
        debug!("un-marshalling {:?}: {}", text, e);
        json!({
            "error": true,
            "message": "data un-marshal error",
            "data": text,
        })
    })
}

/// Decoded wire message, either a single envelope or a batch of them in send order
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Single(Value),
    Batch(Vec<Value>),
}

impl WireMessage {
    pub fn decode(payload: Payload) -> Self {
        Self::from_value(payload.into_value())
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map) => {
                for key in &[BATCH_KEY, LEGACY_BATCH_KEY] {
                    if let Some(Value::Array(_)) = map.get(*key) {
                        if let Some(Value::Array(items)) = map.remove(*key) {
                            return Self::Batch(items);
                        }
                    }
                }
                Self::Single(Value::Object(map))
            }
            other => Self::Single(other),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Single(value) => value.to_string(),
            Self::Batch(items) => encode_batch(items),
        }
    }

    pub fn into_values(self) -> Vec<Value> {
        match self {
            Self::Single(value) => vec![value],
            Self::Batch(items) => items,
        }
    }
}

pub fn encode_batch(items: &[Value]) -> String {
    let mut frame = Map::new();
    frame.insert(BATCH_KEY.to_string(), Value::Array(items.to_vec()));
    Value::Object(frame).to_string()
}

/// Starts a request with a fresh correlation id
pub fn new_call(method: &str) -> Envelope {
    let mut call = Map::new();
    call.insert("id".to_string(), Value::String(random_call_id()));
    call.insert("method".to_string(), Value::String(method.to_string()));
    call
}

/// Starts the response to a request: same id (or a fresh one if it had none), same method, no
/// error yet
pub fn prepare_answer(message: &Value) -> Envelope {
    let id = match message.get("id") {
        Some(id) if !id.is_null() => id.clone(),
        _ => Value::String(random_call_id()),
    };
    let method = message
        .get("method")
        .cloned()
        .unwrap_or_else(|| Value::String(String::new()));
    let mut answer = Map::new();
    answer.insert("id".to_string(), id);
    answer.insert("method".to_string(), method);
    answer.insert("error".to_string(), Value::Null);
    answer
}
