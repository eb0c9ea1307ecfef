use super::*;

/// Network tests spin up servers, so this is more generous than a pure unit test would need
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        format!("non-string panic payload {:?}", payload.type_id())
    }
}

/// Runs the function on its own thread and panics if it takes longer than the given duration.
/// Panics inside the function are re-raised with their message.
/// Originally from https://github.com/rust-lang/rfcs/issues/2798#issuecomment-552949300
pub fn run_with_specific_timeout<T, F>(d: Duration, f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T,
    F: Send + 'static,
{
    let (done_tx, done_rx) = channel();
    let handle = thread::spawn(move || {
        let val = f();
        done_tx.send(()).expect("unable to send completion signal");
        val
    });

    match done_rx.recv_timeout(d) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => match handle.join() {
            Ok(result) => result,
            Err(e) => panic!("thread panicked: {}", panic_message(&*e)),
        },
        Err(RecvTimeoutError::Timeout) => panic!("thread timed out"),
    }
}

/// Same as run_with_specific_timeout() with DEFAULT_TIMEOUT
pub fn run_with_timeout<T, F>(f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T,
    F: Send + 'static,
{
    run_with_specific_timeout(DEFAULT_TIMEOUT, f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_value() {
        let result = run_with_timeout(move || {
            thread::sleep(Duration::from_millis(20));
            12
        });
        assert_eq!(result, 12);
    }

    #[test]
    #[should_panic(expected = "timed out")]
    fn times_out() {
        run_with_specific_timeout(Duration::from_millis(50), move || {
            thread::sleep(Duration::from_secs(5));
        });
    }

    #[test]
    #[should_panic(expected = "this is fine")]
    fn shows_panic_message() {
        run_with_timeout(move || {
            panic!("this is fine");
        });
    }
}
