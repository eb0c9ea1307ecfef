use super::*;
use slotmap::SlotMap;

/// Upper bound on how long the loop sleeps without checking for a stop request
const IDLE_WAIT: Duration = Duration::from_millis(250);

new_key_type! {
    /// Identifies a scheduled task so it can be cancelled
    pub struct TimerKey;
}

type Task = Box<dyn FnOnce()>;
/// Drains one remote channel. Returns false once every sender is gone.
type Source = Box<dyn FnMut() -> bool>;

struct Timer {
    deadline: Duration,
    seq: u64,
    task: Task,
}

struct EventLoopImpl {
    clock: Clock,
    timers: RefCell<SlotMap<TimerKey, Timer>>,
    /// Ordered by deadline, then by scheduling order
    queue: RefCell<BTreeMap<(Duration, u64), TimerKey>>,
    next_seq: Cell<u64>,
    sources: RefCell<Vec<Source>>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    stop_requested: Arc<AtomicBool>,
}

/// Cheap to clone handle to the loop. All clones share the same queue.
#[derive(Clone)]
pub struct EventLoop(Rc<EventLoopImpl>);

impl EventLoop {
    /// A loop driven by the real clock
    pub fn new() -> Self {
        Self::with_clock(Clock::Real(Instant::now()))
    }

    /// A loop whose clock only moves on advance(), for deterministic tests
    pub fn new_manual() -> Self {
        Self::with_clock(Clock::Manual(Cell::new(Duration::ZERO)))
    }

    fn with_clock(clock: Clock) -> Self {
        let (wake_tx, wake_rx) = channel();
        Self(Rc::new(EventLoopImpl {
            clock,
            timers: RefCell::new(SlotMap::with_key()),
            queue: RefCell::new(BTreeMap::new()),
            next_seq: Cell::new(0),
            sources: RefCell::new(Vec::new()),
            wake_tx,
            wake_rx,
            stop_requested: Arc::new(AtomicBool::new(false)),
        }))
    }

    pub fn now(&self) -> Duration {
        self.0.clock.now()
    }

    /// Runs the task on the next tick, after everything already due
    pub fn defer<F: FnOnce() + 'static>(&self, f: F) -> TimerKey {
        self.schedule(Duration::ZERO, f)
    }

    pub fn schedule<F: FnOnce() + 'static>(&self, delay: Duration, f: F) -> TimerKey {
        let deadline = self.now() + delay;
        let seq = self.0.next_seq.get();
        self.0.next_seq.set(seq + 1);
        let key = self.0.timers.borrow_mut().insert(Timer {
            deadline,
            seq,
            task: Box::new(f),
        });
        self.0.queue.borrow_mut().insert((deadline, seq), key);
        key
    }

    /// Returns false if the task already ran or was already cancelled
    pub fn cancel(&self, key: TimerKey) -> bool {
        let removed = self.0.timers.borrow_mut().remove(key);
        match removed {
            Some(timer) => {
                self.0
                    .queue
                    .borrow_mut()
                    .remove(&(timer.deadline, timer.seq));
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, key: TimerKey) -> bool {
        self.0.timers.borrow().contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.0.timers.borrow().len()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.0.queue.borrow().keys().next().map(|(deadline, _)| *deadline)
    }

    /// Creates a channel other threads can use to hand values to the handler, which runs on this
    /// loop
    pub fn remote<T, F>(&self, mut handler: F) -> RemoteSender<T>
    where
        T: Send + 'static,
        F: FnMut(T) + 'static,
    {
        let (tx, rx) = channel();
        self.0.sources.borrow_mut().push(Box::new(move || loop {
            match rx.try_recv() {
                Ok(value) => handler(value),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }));
        RemoteSender::new(tx, self.0.wake_tx.clone())
    }

    fn poll_sources(&self) {
        // Taken out so handlers can register new sources while we iterate
        let mut sources = std::mem::take(&mut *self.0.sources.borrow_mut());
        sources.retain_mut(|source| source());
        let mut current = self.0.sources.borrow_mut();
        sources.append(&mut current);
        *current = sources;
    }

    fn pop_due(&self) -> Option<Task> {
        let now = self.now();
        let key = {
            let mut queue = self.0.queue.borrow_mut();
            let (position, key) = match queue.iter().next() {
                Some((position, key)) if position.0 <= now => (*position, *key),
                _ => return None,
            };
            queue.remove(&position);
            key
        };
        let timer = self.0.timers.borrow_mut().remove(key);
        timer.map(|timer| timer.task)
    }

    /// Runs every task that is due, including ones scheduled by those tasks, and delivers values
    /// from remote senders. Returns how many tasks ran.
    pub fn run_ready(&self) -> usize {
        let mut count = 0;
        loop {
            self.poll_sources();
            match self.pop_due() {
                Some(task) => {
                    task();
                    count += 1;
                }
                None => return count,
            }
        }
    }

    /// With a manual clock, moves time forward running timers in deadline order as they come due.
    /// With a real clock, runs the loop for the given time.
    pub fn advance(&self, by: Duration) {
        if !self.0.clock.is_manual() {
            self.run_until(by, || false);
            return;
        }
        let target = self.now() + by;
        loop {
            self.run_ready();
            match self.next_deadline() {
                Some(deadline) if deadline <= target => self.0.clock.set(deadline),
                _ => break,
            }
        }
        self.0.clock.set(target);
        self.run_ready();
    }

    /// Sleeps until woken by a remote sender, the next timer is due, or max_wait passes
    fn wait(&self, max_wait: Duration) {
        let wait = match self.next_deadline() {
            Some(deadline) if !self.0.clock.is_manual() => {
                deadline.saturating_sub(self.now()).min(max_wait)
            }
            _ => max_wait,
        };
        match self.0.wake_rx.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => (),
            // Not possible while we hold wake_tx ourselves
            Err(RecvTimeoutError::Disconnected) => (),
        }
        while self.0.wake_rx.try_recv().is_ok() {}
    }

    /// Runs until a StopHandle is used
    pub fn run(&self) {
        trace!("event loop started");
        while !self.0.stop_requested.load(SeqCst) {
            self.run_ready();
            self.wait(IDLE_WAIT);
        }
        trace!("event loop stopped");
    }

    /// Runs until done() returns true or the timeout passes. Returns whether done() held.
    pub fn run_until<F: Fn() -> bool>(&self, timeout: Duration, done: F) -> bool {
        let start = Instant::now();
        loop {
            self.run_ready();
            if done() {
                return true;
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return false;
            }
            self.wait((timeout - elapsed).min(Duration::from_millis(10)));
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop_requested: self.0.stop_requested.clone(),
            wake_tx: self.0.wake_tx.clone(),
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for EventLoop {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EventLoop at {:?} with {} pending tasks",
            self.now(),
            self.pending_count()
        )
    }
}

/// Can be sent to another thread (a signal handler, for example) to stop EventLoop::run()
#[derive(Clone)]
pub struct StopHandle {
    stop_requested: Arc<AtomicBool>,
    wake_tx: Sender<()>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stop_requested.store(true, SeqCst);
        let _ = self.wake_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        (log, move |name| {
            let log = log_clone.clone();
            Box::new(move || log.borrow_mut().push(name)) as Task
        })
    }

    #[test]
    fn deferred_tasks_run_in_order_on_next_tick() {
        let event_loop = EventLoop::new_manual();
        let (log, task) = recorder();
        event_loop.defer(task("a"));
        event_loop.defer(task("b"));
        assert!(log.borrow().is_empty());
        assert_eq!(event_loop.run_ready(), 2);
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn tasks_deferred_from_tasks_run_in_same_run_ready() {
        let event_loop = EventLoop::new_manual();
        let (log, task) = recorder();
        let inner = event_loop.clone();
        let second = task("second");
        event_loop.defer(move || {
            inner.defer(second);
        });
        event_loop.run_ready();
        assert_eq!(*log.borrow(), vec!["second"]);
    }

    #[test]
    fn timers_wait_for_manual_clock() {
        let event_loop = EventLoop::new_manual();
        let (log, task) = recorder();
        event_loop.schedule(Duration::from_millis(100), task("late"));
        event_loop.run_ready();
        assert!(log.borrow().is_empty());
        event_loop.advance(Duration::from_millis(99));
        assert!(log.borrow().is_empty());
        event_loop.advance(Duration::from_millis(1));
        assert_eq!(*log.borrow(), vec!["late"]);
    }

    #[test]
    fn advance_runs_timers_in_deadline_order() {
        let event_loop = EventLoop::new_manual();
        let (log, task) = recorder();
        event_loop.schedule(Duration::from_millis(30), task("c"));
        event_loop.schedule(Duration::from_millis(10), task("a"));
        event_loop.schedule(Duration::from_millis(20), task("b"));
        event_loop.schedule(Duration::from_millis(20), task("b2"));
        event_loop.advance(Duration::from_secs(1));
        assert_eq!(*log.borrow(), vec!["a", "b", "b2", "c"]);
        assert_eq!(event_loop.now(), Duration::from_secs(1));
    }

    #[test]
    fn timer_scheduled_by_timer_fires_within_same_advance() {
        let event_loop = EventLoop::new_manual();
        let fired_at = Rc::new(Cell::new(None));
        let inner = event_loop.clone();
        let fired_at_clone = fired_at.clone();
        event_loop.schedule(Duration::from_millis(10), move || {
            let again = inner.clone();
            inner.schedule(Duration::from_millis(10), move || {
                fired_at_clone.set(Some(again.now()));
            });
        });
        event_loop.advance(Duration::from_millis(50));
        assert_eq!(fired_at.get(), Some(Duration::from_millis(20)));
    }

    #[test]
    fn cancelled_timer_does_not_run() {
        let event_loop = EventLoop::new_manual();
        let (log, task) = recorder();
        let key = event_loop.schedule(Duration::from_millis(5), task("never"));
        assert!(event_loop.is_pending(key));
        assert!(event_loop.cancel(key));
        assert!(!event_loop.cancel(key));
        event_loop.advance(Duration::from_millis(10));
        assert!(log.borrow().is_empty());
        assert_eq!(event_loop.pending_count(), 0);
    }

    #[test]
    fn cancel_after_run_returns_false() {
        let event_loop = EventLoop::new_manual();
        let key = event_loop.defer(|| ());
        event_loop.run_ready();
        assert!(!event_loop.cancel(key));
    }

    #[test]
    fn remote_values_arrive_in_order() {
        let event_loop = EventLoop::new_manual();
        let received = Rc::new(RefCell::new(Vec::new()));
        let received_clone = received.clone();
        let sender = event_loop.remote(move |value: u32| received_clone.borrow_mut().push(value));
        let handle = thread::spawn(move || {
            for i in 0..5 {
                sender.send(i).unwrap();
            }
        });
        handle.join().unwrap();
        event_loop.run_ready();
        assert_eq!(*received.borrow(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn run_until_wakes_for_remote_values() {
        let event_loop = EventLoop::new();
        let received = Rc::new(Cell::new(0));
        let received_clone = received.clone();
        let sender = event_loop.remote(move |value: u32| received_clone.set(value));
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            sender.send(42).unwrap();
        });
        assert!(event_loop.run_until(Duration::from_secs(2), || received.get() == 42));
    }

    #[test]
    fn run_until_gives_up_after_timeout() {
        let event_loop = EventLoop::new();
        assert!(!event_loop.run_until(Duration::from_millis(30), || false));
    }

    #[test]
    fn real_clock_timers_fire() {
        let event_loop = EventLoop::new();
        let fired = Rc::new(Cell::new(false));
        let fired_clone = fired.clone();
        event_loop.schedule(Duration::from_millis(20), move || fired_clone.set(true));
        assert!(event_loop.run_until(Duration::from_secs(2), || fired.get()));
    }

    #[test]
    fn stop_handle_ends_run() {
        let event_loop = EventLoop::new();
        let stop = event_loop.stop_handle();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            stop.stop();
        });
        run_on_loop_with_timeout(event_loop);
    }

    fn run_on_loop_with_timeout(event_loop: EventLoop) {
        let start = Instant::now();
        event_loop.run();
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
