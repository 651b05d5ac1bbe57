use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Flag {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Cooperative cancellation signal shared between a job and whoever may preempt it.
///
/// Cancelling is one-way and idempotent. Sleeps taken through [`CancelToken::sleep`] wake up
/// immediately when the token is cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<Flag>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.flag.cancelled.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn cancel(&self) {
        let mut cancelled = self.lock();
        if !*cancelled {
            *cancelled = true;
            self.flag.wake.notify_all();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.lock()
    }

    /// Sleep for `dur` unless cancelled first.
    ///
    /// Returns `true` if the full duration elapsed, `false` if the token was (or became)
    /// cancelled.
    pub fn sleep(&self, dur: Duration) -> bool {
        let deadline = Instant::now().checked_add(dur);
        let mut cancelled = self.lock();
        loop {
            if *cancelled {
                return false;
            }
            let remaining = match deadline {
                Some(d) => d.saturating_duration_since(Instant::now()),
                None => dur,
            };
            if remaining.is_zero() {
                return true;
            }
            cancelled = self
                .flag
                .wake
                .wait_timeout(cancelled, remaining)
                .map(|(g, _)| g)
                .unwrap_or_else(|p| p.into_inner().0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_idempotent_and_shared_by_clones() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn uncancelled_sleep_runs_full_duration() {
        let t = CancelToken::new();
        let start = Instant::now();
        assert!(t.sleep(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn cancelled_token_does_not_sleep() {
        let t = CancelToken::new();
        t.cancel();
        let start = Instant::now();
        assert!(!t.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn cancel_wakes_a_sleeping_thread_early() {
        let t = CancelToken::new();
        let sleeper = t.clone();
        let start = Instant::now();
        let h = std::thread::spawn(move || sleeper.sleep(Duration::from_secs(10)));
        std::thread::sleep(Duration::from_millis(50));
        t.cancel();
        assert!(!h.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn zero_sleep_returns_immediately() {
        assert!(CancelToken::new().sleep(Duration::ZERO));
    }
}
