use super::*;
use std::ops::Deref;

pub const DEFAULT_LOCAL_ENDPOINT: &str = "default_local_endpoint";

/// Acceptor for in-process clients created with connect_local()
pub struct LocalAcceptor {
    acceptor: Acceptor,
}

impl LocalAcceptor {
    /// Fails if another live acceptor is registered on the endpoint
    pub fn new(
        endpoint: Option<&str>,
        registry: &EndpointRegistry,
        event_loop: &EventLoop,
        settings: &PipeSettings,
    ) -> Result<Self, Box<dyn Error>> {
        let endpoint = endpoint
            .filter(|endpoint| !endpoint.is_empty())
            .unwrap_or(DEFAULT_LOCAL_ENDPOINT);
        let acceptor = Acceptor::new(AcceptorKind::Local, endpoint, event_loop, settings);
        registry.register_local(endpoint, &acceptor)?;
        let registry = registry.clone();
        let key = endpoint.to_string();
        let id = acceptor.id();
        acceptor.on_teardown(move || registry.unregister(&key, id));
        acceptor.announce_open();
        trace!("local acceptor listening on {:?}", endpoint);
        Ok(Self { acceptor })
    }

    pub fn acceptor(&self) -> &Acceptor {
        &self.acceptor
    }
}

impl Deref for LocalAcceptor {
    type Target = Acceptor;

    fn deref(&self) -> &Self::Target {
        &self.acceptor
    }
}
