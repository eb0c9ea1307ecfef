use super::*;

/// Real time for production, virtual time that only moves when told to for tests
pub enum Clock {
    Real(Instant),
    Manual(Cell<Duration>),
}

impl Clock {
    /// Time since the loop was created
    pub fn now(&self) -> Duration {
        match self {
            Clock::Real(start) => start.elapsed(),
            Clock::Manual(now) => now.get(),
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, Clock::Manual(_))
    }

    /// Only moves manual clocks, and never backwards
    pub fn set(&self, time: Duration) {
        if let Clock::Manual(now) = self {
            if time > now.get() {
                now.set(time);
            }
        }
    }
}
