//! # Single-threaded scheduler
//!
//! Every state transition in this crate happens on one thread, driven by deferred tasks, timers
//! and values arriving from other threads through a [`RemoteSender`]. Components hold a cloned
//! [`EventLoop`] handle instead of reaching for any global.

use super::*;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering::SeqCst},
        mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError},
        Arc,
    },
    time::Instant,
};

mod clock;
mod event_loop;
mod remote_sender;

pub use event_loop::{EventLoop, StopHandle, TimerKey};
pub use remote_sender::RemoteSender;

use clock::Clock;
