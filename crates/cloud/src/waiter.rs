//! # Operation waiter
//!
//! Bounded polling for asynchronous cloud operations: fixed interval,
//! fixed overall timeout, transient query errors tolerated until the
//! timeout elapses.
//!
//! There is no cancellation signal. A caller that gives up must drop the
//! future and treat the submitted operation as committed on the provider
//! side; this primitive cannot revoke it.

use crate::connector::OperationPoller;
use crate::error::CloudError;
use crate::types::{OperationRef, OperationStatus};
use std::time::Duration;
use tracing::debug;

/// Default polling interval, matching provider operation latency.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Default overall bound: 10 minutes.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Polls a single operation until it reports done or the bound elapses.
#[derive(Debug, Clone)]
pub struct OperationWaiter {
    interval: Duration,
    timeout: Duration,
}

impl Default for OperationWaiter {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL, DEFAULT_TIMEOUT)
    }
}

impl OperationWaiter {
    #[must_use]
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Block until the operation reports done.
    ///
    /// A poll error is treated as "not yet done": logged at debug and
    /// retried on the next tick. The only terminal outcomes are `Ok(())`
    /// on completion and [`CloudError::Timeout`] once the bound elapses;
    /// the timeout fires no later than one interval past the bound.
    pub async fn wait<P>(&self, poller: &P, op: &OperationRef) -> Result<(), CloudError>
    where
        P: OperationPoller + ?Sized,
    {
        let mut waited = Duration::ZERO;
        let mut attempt = 0u32;
        loop {
            match poller.poll_operation(op).await {
                Ok(OperationStatus::Done) => {
                    debug!(operation = %op.name, attempt, "operation complete");
                    return Ok(());
                }
                Ok(status) => {
                    debug!(operation = %op.name, attempt, ?status, "operation still running");
                }
                Err(e) => {
                    debug!(operation = %op.name, attempt, error = %e, "poll failed, retrying");
                }
            }
            if waited >= self.timeout {
                return Err(CloudError::Timeout {
                    operation: op.name.clone(),
                    waited,
                });
            }
            tokio::time::sleep(self.interval).await;
            waited += self.interval;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    /// Poller that reports done after a fixed number of polls, optionally
    /// failing some polls on the way.
    struct ScriptedPoller {
        polls: AtomicU32,
        done_after: u32,
        fail_until: u32,
    }

    impl ScriptedPoller {
        fn done_after(n: u32) -> Self {
            Self { polls: AtomicU32::new(0), done_after: n, fail_until: 0 }
        }

        fn failing_then_done(fail: u32, done: u32) -> Self {
            Self { polls: AtomicU32::new(0), done_after: done, fail_until: fail }
        }

        fn never_done() -> Self {
            Self { polls: AtomicU32::new(0), done_after: u32::MAX, fail_until: 0 }
        }
    }

    #[async_trait::async_trait]
    impl OperationPoller for ScriptedPoller {
        async fn poll_operation(
            &self,
            _op: &OperationRef,
        ) -> Result<OperationStatus, CloudError> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_until {
                return Err(CloudError::Api("backend unavailable".to_string()));
            }
            if n >= self.done_after {
                Ok(OperationStatus::Done)
            } else {
                Ok(OperationStatus::Running)
            }
        }
    }

    fn fast_waiter() -> OperationWaiter {
        OperationWaiter::new(Duration::from_millis(10), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn returns_ok_when_operation_completes() {
        let poller = ScriptedPoller::done_after(3);
        let waiter = fast_waiter();
        let op = OperationRef::zonal("op-create-node");
        waiter.wait(&poller, &op).await.unwrap();
        assert_eq!(poller.polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn transient_poll_errors_are_swallowed() {
        let poller = ScriptedPoller::failing_then_done(2, 4);
        let waiter = fast_waiter();
        let op = OperationRef::global("op-create-template");
        waiter.wait(&poller, &op).await.unwrap();
    }

    #[tokio::test]
    async fn times_out_within_one_interval_past_the_bound() {
        let poller = ScriptedPoller::never_done();
        let waiter = OperationWaiter::new(Duration::from_millis(20), Duration::from_millis(100));
        let op = OperationRef::zonal("op-stuck");

        let started = Instant::now();
        let err = waiter.wait(&poller, &op).await.unwrap_err();
        let elapsed = started.elapsed();

        match err {
            CloudError::Timeout { operation, .. } => assert_eq!(operation, "op-stuck"),
            other => panic!("expected timeout, got {other}"),
        }
        // Not sooner than the bound, not later than one interval past it
        // (generous upper slack for scheduler jitter).
        assert!(elapsed >= Duration::from_millis(100), "returned too early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(200), "returned too late: {elapsed:?}");
    }
}
