//! Events and the listener registry every other component is built on

use super::*;

mod event;
mod event_dispatcher;
mod event_source;

pub use event::Event;
pub use event_dispatcher::{listener, EventDispatcher, Listener};
pub use event_source::EventSource;
