//! Fixed-delay reconnect policy on top of `backoff::backoff::Constant`.
//!
//! Kept apart from the transport so the timing and hook behaviour can be
//! tested without a socket.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use backoff::backoff::{Backoff, Constant};

/// Default pause between losing the upstream and the next connect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Callback invoked with an attempt number.
pub type ReconnectHook = Arc<dyn Fn(u64) + Send + Sync>;

/// Retry forever with the same delay between attempts.
///
/// Attempt numbers count reconnect attempts since the last live session:
/// `0` is the initial connect, `1` the first retry after a disconnect, and
/// so on while connects keep failing.
#[derive(Clone)]
pub struct ReconnectPolicy {
    backoff: Arc<Mutex<Constant>>,
    delay: Duration,
    on_success: Option<ReconnectHook>,
    on_failure: Option<ReconnectHook>,
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            backoff: Arc::new(Mutex::new(Constant::new(delay))),
            delay,
            on_success: None,
            on_failure: None,
        }
    }

    /// Run `hook` each time a connection is established.
    pub fn with_on_success(mut self, hook: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(hook));
        self
    }

    /// Run `hook` each time a retry is scheduled.
    pub fn with_on_failure(mut self, hook: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.on_failure = Some(Arc::new(hook));
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Connection `attempt` succeeded.
    pub fn record_success(&self, attempt: u64) {
        self.backoff().reset();
        if let Some(hook) = &self.on_success {
            hook(attempt);
        }
    }

    /// Retry number `attempt` is about to be scheduled; returns how long to
    /// wait first. There is no attempt limit.
    pub fn record_failure(&self, attempt: u64) -> Duration {
        if let Some(hook) = &self.on_failure {
            hook(attempt);
        }
        let mut backoff = self.backoff();
        backoff.next_backoff().unwrap_or(self.delay)
    }

    fn backoff(&self) -> MutexGuard<'_, Constant> {
        self.backoff.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl fmt::Debug for ReconnectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectPolicy")
            .field("delay", &self.delay())
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    #[test]
    fn default_delay_is_five_seconds() {
        assert_eq!(ReconnectPolicy::default().delay(), Duration::from_secs(5));
    }

    #[test]
    fn delay_never_grows() {
        let policy = ReconnectPolicy::fixed(Duration::from_millis(250));
        for attempt in 1..=1_000 {
            assert_eq!(policy.record_failure(attempt), Duration::from_millis(250));
        }
    }

    #[test]
    fn success_does_not_change_the_delay() {
        let policy = ReconnectPolicy::fixed(Duration::from_millis(40));
        assert_eq!(policy.record_failure(1), Duration::from_millis(40));
        policy.record_success(1);
        assert_eq!(policy.record_failure(1), Duration::from_millis(40));
        assert_eq!(policy.delay(), Duration::from_millis(40));
    }

    #[test]
    fn hooks_receive_attempt_numbers() {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let successes = Arc::new(AtomicU64::new(0));

        let f = failures.clone();
        let s = successes.clone();
        let policy = ReconnectPolicy::fixed(Duration::from_secs(1))
            .with_on_failure(move |attempt| f.lock().unwrap().push(attempt))
            .with_on_success(move |attempt| s.store(attempt, Ordering::SeqCst));

        policy.record_failure(1);
        policy.record_failure(2);
        policy.record_success(2);

        assert_eq!(*failures.lock().unwrap(), vec![1, 2]);
        assert_eq!(successes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clones_share_hooks() {
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        let policy = ReconnectPolicy::fixed(Duration::from_secs(1))
            .with_on_failure(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            });
        let clone = policy.clone();
        policy.record_failure(1);
        clone.record_failure(1);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
