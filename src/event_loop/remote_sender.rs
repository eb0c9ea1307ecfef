use super::*;

/// Thread-safe way to get values onto an event loop. The loop runs the handler it was created
/// with for each value, in the order they were sent.
pub struct RemoteSender<T> {
    tx: Sender<T>,
    wake_tx: Sender<()>,
}

impl<T: Send + 'static> RemoteSender<T> {
    pub(super) fn new(tx: Sender<T>, wake_tx: Sender<()>) -> Self {
        Self { tx, wake_tx }
    }

    pub fn send(&self, value: T) -> Result<(), Box<dyn Error>> {
        self.tx
            .send(value)
            .map_err(|_| "event loop is gone, value dropped")?;
        // If the loop is gone the value is unreachable anyway
        let _ = self.wake_tx.send(());
        Ok(())
    }
}

impl<T> Clone for RemoteSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            wake_tx: self.wake_tx.clone(),
        }
    }
}

impl<T> Debug for RemoteSender<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RemoteSender<{}>", std::any::type_name::<T>())
    }
}
