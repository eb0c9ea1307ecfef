use super::*;

use std::{
    sync::{
        atomic::{AtomicBool, Ordering::SeqCst},
        mpsc::{channel, RecvTimeoutError},
        Arc, Mutex,
    },
    thread,
};

mod mock_filesystem;
mod mock_transport;
mod provision_socket;
mod recorded_events;
mod run_with_timeout;
mod scripted_signaling;

pub use mock_filesystem::*;
pub use mock_transport::*;
pub use provision_socket::*;
pub use recorded_events::*;
pub use run_with_timeout::*;
pub use scripted_signaling::*;
