//! Retry strategy.
//!
//! The simplest failover strategy: re-run the operation against the same
//! provider, up to a fixed number of tries, while the error matches a retry
//! predicate. The operation's time constraint is split evenly across the
//! tries that remain, so the total never exceeds the caller's bound: with
//! `times(3)` and a 3-second constraint the first try gets 1 second, and a
//! try that fails fast donates its unused share to the survivors.

use crate::deadline::TimeConstraint;
use crate::error::Error;
use crate::failover::{FailoverStrategy, FailoverTry, TryContext};

/// Retry an operation on matching errors.
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    tries: u32,
    should_retry: fn(&Error) -> bool,
}

impl RetryStrategy {
    /// Retry on [`Error::is_transient`] errors, once (no retries) until
    /// [`times`](Self::times) raises the budget.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tries: 1,
            should_retry: Error::is_transient,
        }
    }

    /// Set the total number of tries (the first attempt included).
    #[must_use]
    pub fn times(mut self, tries: u32) -> Self {
        self.tries = tries.max(1);
        self
    }

    /// Replace the retry predicate.
    #[must_use]
    pub fn retry_when(mut self, predicate: fn(&Error) -> bool) -> Self {
        self.should_retry = predicate;
        self
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::new()
    }
}

/// Try produced by [`RetryStrategy`].
#[derive(Debug)]
pub struct RetryTry<P> {
    provider: P,
    time_constraint: TimeConstraint,
    tries_remain: u32,
    should_retry: fn(&Error) -> bool,
}

impl<P> RetryTry<P> {
    /// Number of tries remaining, this one included.
    #[must_use]
    pub fn tries_remain(&self) -> u32 {
        self.tries_remain
    }
}

impl<P: Clone + Send + Sync> FailoverTry<P> for RetryTry<P> {
    fn context(&self) -> TryContext<P> {
        TryContext {
            provider: self.provider.clone(),
            time_constraint: self.time_constraint.divided_by(self.tries_remain),
        }
    }

    fn next_try(self, err: &Error) -> Option<Self> {
        if self.tries_remain > 1 && (self.should_retry)(err) {
            Some(Self {
                tries_remain: self.tries_remain - 1,
                ..self
            })
        } else {
            None
        }
    }
}

impl<P: Clone + Send + Sync> FailoverStrategy<P> for RetryStrategy {
    type Try = RetryTry<P>;

    fn first_try(&self, provider: &P, t: TimeConstraint) -> Self::Try {
        RetryTry {
            provider: provider.clone(),
            time_constraint: t,
            tries_remain: self.tries,
            should_retry: self.should_retry,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::failover::execute;
    use std::cell::Cell;
    use std::time::Duration;

    #[tokio::test]
    async fn test_retry_until_success() {
        let strategy = RetryStrategy::new().times(3);
        let calls = Cell::new(0u32);

        let outcome = execute(&strategy, (), TimeConstraint::None, |(), _t| {
            calls.set(calls.get() + 1);
            let attempt = calls.get();
            async move {
                if attempt < 3 {
                    Err(Error::Timeout)
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(outcome.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let strategy = RetryStrategy::new().times(2);
        let calls = Cell::new(0u32);

        let outcome: Result<(), Error> = execute(&strategy, (), TimeConstraint::None, |(), _t| {
            calls.set(calls.get() + 1);
            async { Err(Error::Timeout) }
        })
        .await;

        assert!(matches!(outcome, Err(Error::Timeout)));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_non_matching_error_is_not_retried() {
        let strategy = RetryStrategy::new().times(5);
        let calls = Cell::new(0u32);

        let outcome: Result<(), Error> = execute(&strategy, (), TimeConstraint::None, |(), _t| {
            calls.set(calls.get() + 1);
            async { Err(Error::EmptyQuery) }
        })
        .await;

        assert!(matches!(outcome, Err(Error::EmptyQuery)));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_time_constraint_split_across_tries() {
        let strategy = RetryStrategy::new().times(4);
        let seen = Cell::new(TimeConstraint::None);

        let _ = execute(
            &strategy,
            (),
            TimeConstraint::In(Duration::from_secs(4)),
            |(), t| {
                seen.set(t);
                async { Ok(()) }
            },
        )
        .await;

        assert_eq!(seen.get(), TimeConstraint::In(Duration::from_secs(1)));
    }

    #[test]
    fn test_times_floor_is_one() {
        let strategy = RetryStrategy::new().times(0);
        assert_eq!(strategy.tries, 1);
    }
}
