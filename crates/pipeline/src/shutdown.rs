//! Cooperative shutdown and interruptible backoff sleeps.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Process-wide stop flag. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = true;
        cvar.notify_all();
    }

    pub fn is_requested(&self) -> bool {
        *self
            .inner
            .0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait up to `timeout` for shutdown. Returns `true` if it was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut requested = flag.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        while !*requested {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            requested = match cvar.wait_timeout(requested, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    /// Block until shutdown is requested.
    pub fn wait(&self) {
        let (flag, cvar) = &*self.inner;
        let mut requested = flag.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while !*requested {
            requested = cvar
                .wait(requested)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    Elapsed,
    Interrupted,
}

/// Backoff sleep. Implementations return early when shutdown is requested.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, delay: Duration, shutdown: &ShutdownSignal) -> SleepOutcome;
}

impl<S> Sleeper for Arc<S>
where
    S: Sleeper + ?Sized,
{
    fn sleep(&self, delay: Duration, shutdown: &ShutdownSignal) -> SleepOutcome {
        (**self).sleep(delay, shutdown)
    }
}

/// Real sleeper: waits on the shutdown signal for the delay.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShutdownAwareSleeper;

impl Sleeper for ShutdownAwareSleeper {
    fn sleep(&self, delay: Duration, shutdown: &ShutdownSignal) -> SleepOutcome {
        if shutdown.wait_timeout(delay) {
            SleepOutcome::Interrupted
        } else {
            SleepOutcome::Elapsed
        }
    }
}

/// Sleeper that records requested delays and returns at once.
///
/// Still honors a shutdown that was already requested.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, delay: Duration, shutdown: &ShutdownSignal) -> SleepOutcome {
        self.delays
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(delay);

        if shutdown.is_requested() {
            SleepOutcome::Interrupted
        } else {
            SleepOutcome::Elapsed
        }
    }
}
