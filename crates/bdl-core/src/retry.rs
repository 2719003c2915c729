//! Bounded retry with a fixed delay or an explicit delay schedule.
//!
//! An operation reports each attempt as [`Attempt::Done`], [`Attempt::Retry`]
//! or [`Attempt::Abort`]. The policy stops at the first `Done` or `Abort`, or
//! after `max_attempts` retries, and keeps "ran out of attempts" apart from
//! "gave up early" in [`RetryError`].

use std::future::Future;
use std::time::Duration;

#[derive(Debug)]
pub enum Attempt<T, E> {
    Done(T),
    Retry(E),
    Abort(E),
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    #[error("aborted on attempt {attempt}: {error}")]
    Aborted { attempt: u32, error: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Aborted { attempt, .. } => *attempt,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Aborted { error, .. } => error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// Explicit delay before each attempt; the first entry precedes attempt 1.
    Schedule(Vec<Duration>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one.
    #[must_use]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Fixed(delay),
        }
    }

    /// One attempt per entry in `delays`.
    #[must_use]
    pub fn schedule(delays: Vec<Duration>) -> Self {
        let max_attempts = u32::try_from(delays.len()).unwrap_or(u32::MAX).max(1);
        Self {
            max_attempts,
            backoff: Backoff::Schedule(delays),
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay slept before `attempt` (1-based).
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        match &self.backoff {
            Backoff::Fixed(delay) => {
                if attempt <= 1 {
                    Duration::ZERO
                } else {
                    *delay
                }
            }
            Backoff::Schedule(delays) => delays
                .get(attempt.saturating_sub(1) as usize)
                .copied()
                .unwrap_or(Duration::ZERO),
        }
    }

    /// Run a synchronous operation under this policy.
    ///
    /// # Errors
    /// Returns [`RetryError::Aborted`] when the operation aborts and
    /// [`RetryError::Exhausted`] when every attempt asked for a retry.
    pub async fn run<T, E, F>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Attempt<T, E>,
    {
        self.run_async(|attempt| std::future::ready(op(attempt)))
            .await
    }

    /// Run an asynchronous operation under this policy.
    ///
    /// # Errors
    /// Same as [`RetryPolicy::run`].
    pub async fn run_async<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
    {
        let mut attempt = 1;
        loop {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match op(attempt).await {
                Attempt::Done(value) => return Ok(value),
                Attempt::Abort(error) => return Err(RetryError::Aborted { attempt, error }),
                Attempt::Retry(last) if attempt >= self.max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last,
                    });
                }
                Attempt::Retry(_) => attempt += 1,
            }
        }
    }
}
