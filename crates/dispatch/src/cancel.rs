//! Cooperative cancellation and per-attempt deadlines

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Shared cancellation flag for one run.
///
/// Cloning yields a handle to the same flag. Waiting on the token releases its
/// lock while suspended.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every waiter
    pub fn cancel(&self) {
        let (lock, condvar) = &*self.inner;
        *lock_flag(lock) = true;
        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *lock_flag(&self.inner.0)
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns `true` if the token was cancelled.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let (lock, condvar) = &*self.inner;
        let guard = lock_flag(lock);
        let (guard, _) = condvar
            .wait_timeout_while(guard, duration, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

fn lock_flag(lock: &Mutex<bool>) -> MutexGuard<'_, bool> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Fallback horizon for deadlines that overflow `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Hard deadline for one connector attempt, plus the run's cancel token.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    cancel: CancelToken,
}

impl Deadline {
    /// Timeouts past what `Instant` can represent are clamped.
    pub fn new(timeout: Duration, cancel: CancelToken) -> Self {
        let now = Instant::now();
        let at = now
            .checked_add(timeout)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        Self { at, cancel }
    }

    pub fn at(&self) -> Instant {
        self.at
    }

    /// Time left before the attempt is abandoned (zero once expired)
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Connectors should give up when this returns true
    pub fn should_stop(&self) -> bool {
        self.is_expired() || self.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_wait_timeout_elapses_without_cancel() {
        let token = CancelToken::new();
        let started = Instant::now();
        assert!(!token.wait_timeout(Duration::from_millis(20)));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_wait_timeout_wakes_on_cancel() {
        let token = CancelToken::new();
        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });
        let started = Instant::now();
        assert!(token.wait_timeout(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_deadline_expiry() {
        let deadline = Deadline::new(Duration::ZERO, CancelToken::new());
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
        assert!(deadline.should_stop());

        let cancel = CancelToken::new();
        let deadline = Deadline::new(Duration::from_secs(60), cancel.clone());
        assert!(!deadline.should_stop());
        cancel.cancel();
        assert!(deadline.should_stop());
    }

    #[test]
    fn test_huge_timeout_does_not_overflow() {
        let deadline = Deadline::new(Duration::MAX, CancelToken::new());
        assert!(!deadline.is_expired());
        assert!(deadline.remaining() > Duration::from_secs(24 * 60 * 60));

        let deadline = Deadline::new(Duration::from_secs(u64::MAX), CancelToken::new());
        assert!(!deadline.should_stop());
    }
}
