//! Deadline & Retry Utilities
//!
//! Deadlines are enforced per call with tokio timers rather than process
//! signals, so they nest and work from any task. Two flavours exist:
//!
//! - [`Deadline::run`] drops the operation's future on expiry. Anything the
//!   future owns is released at that point.
//! - [`Deadline::run_with_token`] hands the operation a
//!   [`CancellationToken`] and cancels it on expiry. The operation is expected
//!   to observe the token; one that ignores it still runs to completion, but
//!   the caller gets [`DeadlineError::Exceeded`] regardless of its result.
//!
//! In both cases the timer lives inside the returned future and is gone on
//! every exit path.

use bulwark_config::{DeadlineComponentConfig, RetryComponentConfig};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ResilienceError;

const ADAPTIVE_MULTIPLIER: f64 = 2.5;

/// Outcome of a call run under a deadline
#[derive(Error, Debug)]
pub enum DeadlineError<E> {
    #[error("{operation} timed out after {limit:?}")]
    Exceeded { operation: String, limit: Duration },

    #[error(transparent)]
    Inner(E),
}

impl<E> DeadlineError<E> {
    pub fn is_exceeded(&self) -> bool {
        matches!(self, DeadlineError::Exceeded { .. })
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            DeadlineError::Inner(e) => Some(e),
            DeadlineError::Exceeded { .. } => None,
        }
    }
}

impl<E: Into<ResilienceError>> DeadlineError<E> {
    /// Flatten into the crate error
    pub fn into_resilience_error(self) -> ResilienceError {
        match self {
            DeadlineError::Exceeded { operation, limit } => {
                ResilienceError::DeadlineExceeded { operation, limit }
            }
            DeadlineError::Inner(e) => e.into(),
        }
    }
}

impl<E: Into<ResilienceError>> From<DeadlineError<E>> for ResilienceError {
    fn from(err: DeadlineError<E>) -> Self {
        err.into_resilience_error()
    }
}

/// A named upper bound on how long one operation may run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deadline {
    operation: String,
    limit: Duration,
}

impl Deadline {
    pub fn new(operation: impl Into<String>, limit: Duration) -> Self {
        Self {
            operation: operation.into(),
            limit,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    fn exceeded<E>(&self) -> DeadlineError<E> {
        warn!(operation = %self.operation, limit = ?self.limit, "Deadline exceeded");
        DeadlineError::Exceeded {
            operation: self.operation.clone(),
            limit: self.limit,
        }
    }

    /// Run `future`, dropping it if it is still pending when the deadline fires
    pub async fn run<Fut, T, E>(&self, future: Fut) -> Result<T, DeadlineError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        match tokio::time::timeout(self.limit, future).await {
            Ok(result) => result.map_err(DeadlineError::Inner),
            Err(_) => Err(self.exceeded()),
        }
    }

    /// Run `operation` with a token that is cancelled when the deadline fires
    ///
    /// The token is also cancelled once the call returns, whichever way it
    /// returns, so anything the operation spawned against it winds down.
    pub async fn run_with_token<F, Fut, T, E>(&self, operation: F) -> Result<T, DeadlineError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let token = CancellationToken::new();
        let _cancel_on_exit = token.clone().drop_guard();

        let future = operation(token.child_token());
        tokio::pin!(future);

        tokio::select! {
            biased;
            result = &mut future => result.map_err(DeadlineError::Inner),
            _ = tokio::time::sleep(self.limit) => {
                token.cancel();
                debug!(operation = %self.operation, "Deadline fired, waiting for operation to observe cancellation");
                let _ = future.await;
                Err(self.exceeded())
            }
        }
    }
}

/// Combinator form of [`Deadline::run`]
pub async fn with_deadline<Fut, T, E>(
    operation: &str,
    limit: Duration,
    future: Fut,
) -> Result<T, DeadlineError<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    Deadline::new(operation, limit).run(future).await
}

/// Measures how long an operation took
#[derive(Debug)]
pub struct OperationTimer {
    operation: String,
    started: Instant,
}

impl OperationTimer {
    pub fn start(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stop the timer and return the elapsed time
    pub fn finish(self) -> Duration {
        let elapsed = self.elapsed();
        debug!(operation = %self.operation, elapsed = ?elapsed, "Operation finished");
        elapsed
    }
}

/// Deadline that follows the observed latency of successful calls
///
/// Recommends `clamp(2.5 * mean(last N successes), base, max)`, or `base`
/// before anything has been observed.
#[derive(Debug)]
pub struct AdaptiveDeadline {
    base: Duration,
    max: Duration,
    capacity: usize,
    history: Mutex<VecDeque<Duration>>,
}

impl AdaptiveDeadline {
    pub fn new(base: Duration, max: Duration, capacity: usize) -> Self {
        Self {
            base,
            max: max.max(base),
            capacity: capacity.max(1),
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn from_config(config: &DeadlineComponentConfig) -> Self {
        Self::new(
            config.base_timeout(),
            config.max_timeout(),
            config.adaptive_history,
        )
    }

    /// The deadline the next call should get
    pub fn recommended(&self) -> Duration {
        let history = self.history.lock();
        if history.is_empty() {
            return self.base;
        }
        let total: Duration = history.iter().sum();
        let mean = total.as_secs_f64() / history.len() as f64;
        let scaled = Duration::from_secs_f64(mean * ADAPTIVE_MULTIPLIER);
        scaled.clamp(self.base, self.max)
    }

    /// Record the duration of a successful call
    pub fn record_success(&self, duration: Duration) {
        let mut history = self.history.lock();
        history.push_back(duration);
        while history.len() > self.capacity {
            history.pop_front();
        }
    }

    pub fn history(&self) -> Vec<Duration> {
        self.history.lock().iter().copied().collect()
    }

    /// Run `future` under the recommended deadline; only successes are recorded
    pub async fn run<Fut, T, E>(&self, operation: &str, future: Fut) -> Result<T, DeadlineError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let deadline = Deadline::new(operation, self.recommended());
        let timer = OperationTimer::start(operation);
        let result = deadline.run(future).await;
        let elapsed = timer.finish();
        if result.is_ok() {
            self.record_success(elapsed);
        }
        result
    }
}

/// Backoff schedule for [`with_retry`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryComponentConfig::default())
    }
}

impl From<&RetryComponentConfig> for RetryPolicy {
    fn from(config: &RetryComponentConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
        }
    }
}

impl RetryPolicy {
    /// `min(base_delay * 2^attempt, max_delay)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Run `operation` under a fresh `deadline` per attempt, retrying only when the
/// deadline is exceeded
///
/// The operation's own failures propagate immediately. When every attempt
/// times out the last [`DeadlineError::Exceeded`] is returned.
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    deadline: &Deadline,
    mut operation: F,
) -> Result<T, DeadlineError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match deadline.run(operation()).await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation = %deadline.operation, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(DeadlineError::Inner(e)) => return Err(DeadlineError::Inner(e)),
            Err(exceeded) => {
                if attempt >= policy.max_retries {
                    warn!(
                        operation = %deadline.operation,
                        attempts = attempt + 1,
                        "All retry attempts timed out"
                    );
                    return Err(exceeded);
                }
                let delay = policy.delay_for(attempt);
                debug!(operation = %deadline.operation, attempt, delay = ?delay, "Retrying after timeout");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_result_before_deadline() {
        let deadline = Deadline::new("fast", Duration::from_secs(1));
        let result = deadline
            .run(async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, &str>(5)
            })
            .await;
        assert_eq!(result.unwrap(), 5);

        let err = deadline.run(async { Err::<(), _>("bad") }).await.unwrap_err();
        assert!(matches!(err, DeadlineError::Inner("bad")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_expires() {
        let start = Instant::now();
        let err = with_deadline("slow", Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, &str>(())
        })
        .await
        .unwrap_err();

        assert!(err.is_exceeded());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(2));
        match err {
            DeadlineError::Exceeded { operation, limit } => {
                assert_eq!(operation, "slow");
                assert_eq!(limit, Duration::from_secs(1));
            }
            DeadlineError::Inner(_) => unreachable!(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadlines_nest() {
        let outer = Deadline::new("outer", Duration::from_secs(10));
        let inner = Deadline::new("inner", Duration::from_secs(1));

        let result = outer
            .run(async {
                let nested = inner
                    .run(async {
                        tokio::time::sleep(Duration::from_secs(3)).await;
                        Ok::<_, &str>(())
                    })
                    .await;
                Ok::<_, &str>(nested.unwrap_err().is_exceeded())
            })
            .await;
        assert!(result.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_cancelled_on_expiry() {
        let observed = Arc::new(AtomicBool::new(false));
        let deadline = Deadline::new("cooperative", Duration::from_secs(1));

        let flag = observed.clone();
        let err = deadline
            .run_with_token(|token| async move {
                tokio::select! {
                    _ = token.cancelled() => {
                        flag.store(true, Ordering::SeqCst);
                        Err::<(), _>("cancelled")
                    }
                    _ = tokio::time::sleep(Duration::from_secs(60)) => Ok(()),
                }
            })
            .await
            .unwrap_err();

        assert!(err.is_exceeded());
        assert!(observed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_cancelled_on_success_exit() {
        let deadline = Deadline::new("quick", Duration::from_secs(1));
        let mut seen = None;
        let value = deadline
            .run_with_token(|token| {
                seen = Some(token.clone());
                async { Ok::<_, &str>(1) }
            })
            .await
            .unwrap();

        assert_eq!(value, 1);
        assert!(seen.unwrap().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_ignoring_operation_still_reports_exceeded() {
        let start = Instant::now();
        let deadline = Deadline::new("stubborn", Duration::from_secs(1));
        let err = deadline
            .run_with_token(|_token| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Ok::<_, &str>(())
            })
            .await
            .unwrap_err();

        assert!(err.is_exceeded());
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[test]
    fn test_adaptive_recommendation_is_clamped() {
        let adaptive = AdaptiveDeadline::new(Duration::from_secs(30), Duration::from_secs(120), 10);
        assert_eq!(adaptive.recommended(), Duration::from_secs(30));

        adaptive.record_success(Duration::from_secs(20));
        assert_eq!(adaptive.recommended(), Duration::from_secs(50));

        adaptive.record_success(Duration::from_secs(180));
        assert_eq!(adaptive.recommended(), Duration::from_secs(120));

        let fast = AdaptiveDeadline::new(Duration::from_secs(30), Duration::from_secs(120), 10);
        fast.record_success(Duration::from_secs(1));
        assert_eq!(fast.recommended(), Duration::from_secs(30));
    }

    #[test]
    fn test_adaptive_history_is_bounded() {
        let adaptive = AdaptiveDeadline::new(Duration::from_secs(1), Duration::from_secs(100), 3);
        for secs in 1..=5 {
            adaptive.record_success(Duration::from_secs(secs));
        }
        assert_eq!(
            adaptive.history(),
            vec![Duration::from_secs(3), Duration::from_secs(4), Duration::from_secs(5)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_adaptive_run_records_only_successes() {
        let adaptive = AdaptiveDeadline::new(Duration::from_secs(2), Duration::from_secs(10), 10);

        adaptive
            .run("ok", async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, &str>(())
            })
            .await
            .unwrap();
        let history = adaptive.history();
        assert_eq!(history.len(), 1);
        assert!(history[0] >= Duration::from_secs(1) && history[0] < Duration::from_secs(2));

        let _ = adaptive.run("err", async { Err::<(), _>("bad") }).await;
        let _ = adaptive
            .run("slow", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, &str>(())
            })
            .await;
        assert_eq!(adaptive.history().len(), 1);
    }

    #[test]
    fn test_retry_delay_schedule() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        };
        let delays: Vec<u64> = (0..5).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts_on_timeouts() {
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        };
        let deadline = Deadline::new("hang", Duration::from_secs(5));
        let attempts = AtomicU32::new(0);
        let start = Instant::now();

        let err = with_retry(&policy, &deadline, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<Result<(), &str>>()
        })
        .await
        .unwrap_err();

        assert!(err.is_exceeded());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // 3 deadlines plus 1s and 2s of backoff
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(18) && elapsed < Duration::from_secs(19));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_does_not_retry_operation_errors() {
        let attempts = AtomicU32::new(0);
        let err = with_retry(
            &RetryPolicy::default(),
            &Deadline::new("bad", Duration::from_secs(1)),
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("rejected") }
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DeadlineError::Inner("rejected")));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_after_timeout() {
        let attempts = AtomicU32::new(0);
        let value = with_retry(
            &RetryPolicy::default(),
            &Deadline::new("flaky", Duration::from_secs(1)),
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        tokio::time::sleep(Duration::from_secs(10)).await;
                    }
                    Ok::<_, &str>(n)
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(value, 1);
    }
}
