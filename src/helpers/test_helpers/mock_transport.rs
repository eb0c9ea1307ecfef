use super::*;

#[derive(Debug, Default)]
struct MockTransportInner {
    sent: Vec<String>,
    fail_with: Option<String>,
    teardown_count: usize,
}

/// Records what a pipe transmits. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MockTransport(Rc<RefCell<MockTransportInner>>);

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed(&self) -> Rc<dyn Transport> {
        Rc::new(self.clone())
    }

    /// Every following transmit fails with the given message
    pub fn fail_with(&self, message: &str) {
        self.0.borrow_mut().fail_with = Some(message.to_string());
    }

    pub fn stop_failing(&self) {
        self.0.borrow_mut().fail_with = None;
    }

    pub fn sent(&self) -> Vec<String> {
        self.0.borrow().sent.clone()
    }

    /// Sent messages parsed as JSON, for comparisons that don't care about key order
    pub fn sent_values(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .map(|text| serde_json::from_str(text).expect("non-JSON message sent"))
            .collect()
    }

    pub fn assert_sent(&self, expected: &[&str]) {
        let expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
        assert_eq!(self.sent(), expected);
    }

    pub fn teardown_count(&self) -> usize {
        self.0.borrow().teardown_count
    }
}

impl Transport for MockTransport {
    fn transmit(&self, _: &Pipe, text: String) -> Result<(), Box<dyn Error>> {
        let mut inner = self.0.borrow_mut();
        if let Some(message) = &inner.fail_with {
            return Err(message.clone().into());
        }
        inner.sent.push(text);
        Ok(())
    }

    fn teardown(&self, _: &Pipe) {
        self.0.borrow_mut().teardown_count += 1;
    }
}

/// A connected pipe over a MockTransport that sends every message immediately
pub fn mock_pipe(subtype: PipeSubtype) -> (Pipe, MockTransport) {
    let transport = MockTransport::new();
    let settings = PipeSettings {
        max_accumulated_messages: 1,
        ..PipeSettings::default()
    };
    let pipe = Pipe::new(
        TransportKind::Local,
        subtype,
        "mock_pipe://",
        &settings,
        transport.boxed(),
    );
    pipe.mark_connected();
    (pipe, transport)
}
