//! Wait conditions raised by the save worker.
//!
//! Both wrap a flag and a condition variable. They differ only in what
//! observing them does: an [`AutoResetSignal`] is consumed by the waiter that
//! sees it, a [`StickySignal`] stays raised until someone calls `reset`.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Flag {
    set: Mutex<bool>,
    cond: Condvar,
}

impl Flag {
    fn set(&self) {
        *self.set.lock() = true;
        self.cond.notify_all();
    }

    fn reset(&self) {
        *self.set.lock() = false;
    }

    fn is_set(&self) -> bool {
        *self.set.lock()
    }

    /// Wait until set or until `timeout` elapses. Clears the flag when
    /// `consume` is true and it was observed set.
    ///
    /// A timeout too large to represent as a deadline waits forever.
    fn wait(&self, timeout: Duration, consume: bool) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut set = self.set.lock();
        while !*set {
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut set, deadline).timed_out() {
                        break;
                    }
                }
                None => self.cond.wait(&mut set),
            }
        }
        let observed = *set;
        if observed && consume {
            *set = false;
        }
        observed
    }
}

/// "A save was just received". Consumed once by whoever observes it.
#[derive(Debug, Default)]
pub struct AutoResetSignal {
    flag: Flag,
}

impl AutoResetSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.flag.set();
    }

    pub fn reset(&self) {
        self.flag.reset();
    }

    /// Peek without consuming.
    pub fn is_set(&self) -> bool {
        self.flag.is_set()
    }

    /// Consume the signal if it is raised, without waiting.
    pub fn try_take(&self) -> bool {
        self.flag.wait(Duration::ZERO, true)
    }

    /// Block up to `timeout` for the signal and consume it.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.flag.wait(timeout, true)
    }
}

/// "At least one save has ever been received". Stays raised until reset.
#[derive(Debug, Default)]
pub struct StickySignal {
    flag: Flag,
}

impl StickySignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.flag.set();
    }

    pub fn reset(&self) {
        self.flag.reset();
    }

    pub fn is_set(&self) -> bool {
        self.flag.is_set()
    }

    /// Block up to `timeout` for the signal. Does not clear it.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.flag.wait(timeout, false)
    }
}
