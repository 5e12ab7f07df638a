//! Bounded retry helper with a fixed backoff schedule.
//!
//! `retry` runs an async operation, and while it fails with an error the
//! predicate classifies as retryable, sleeps for the next backoff slot and
//! tries again. The schedule length is the number of *extra* attempts, so the
//! default `[500ms, 1500ms]` means at most three calls in total.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Backoff schedule for [`retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    backoff: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_millis(&[500, 1500])
    }
}

impl RetryPolicy {
    pub fn new(backoff: Vec<Duration>) -> Self {
        Self { backoff }
    }

    pub fn from_millis(ms: &[u64]) -> Self {
        Self::new(ms.iter().copied().map(Duration::from_millis).collect())
    }

    /// Single attempt, never retries.
    pub fn none() -> Self {
        Self::new(Vec::new())
    }

    pub fn max_attempts(&self) -> usize {
        self.backoff.len() + 1
    }

    pub fn backoff(&self) -> &[Duration] {
        &self.backoff
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// schedule is exhausted. Returns the first success or the last failure.
///
/// `op` receives the zero-based attempt number.
pub async fn retry<T, E, F, Fut, P>(policy: &RetryPolicy, is_retryable: P, mut op: F) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let Some(delay) = policy.backoff.get(attempt) else {
                    return Err(e);
                };
                if !is_retryable(&e) {
                    return Err(e);
                }
                debug!("[retry] attempt {} failed, sleeping {:?}", attempt + 1, delay);
                tokio::time::sleep(*delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestErr {
        Transient,
        Fatal,
    }

    fn zero_backoff(extra: usize) -> RetryPolicy {
        RetryPolicy::new(vec![Duration::ZERO; extra])
    }

    #[test]
    fn default_schedule() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts(), 3);
        assert_eq!(p.backoff()[1], Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let out: Result<u32, TestErr> = retry(&zero_backoff(2), |e| *e == TestErr::Transient, |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err(TestErr::Transient) } else { Ok(7) } }
        })
        .await;
        assert_eq!(out, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_last_error_when_exhausted() {
        let calls = AtomicUsize::new(0);
        let out: Result<u32, TestErr> = retry(&zero_backoff(2), |_| true, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestErr::Transient) }
        })
        .await;
        assert_eq!(out, Err(TestErr::Transient));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_error_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let out: Result<u32, TestErr> = retry(&zero_backoff(2), |e| *e == TestErr::Transient, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestErr::Fatal) }
        })
        .await;
        assert_eq!(out, Err(TestErr::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
