//! Failover framework.
//!
//! A failover strategy turns one operation invocation into a sequence of
//! *tries*. Each try carries the full argument context for that attempt (a
//! provider and a fresh time constraint) plus whatever state the strategy
//! needs to produce the next try from a failure. [`execute`] is the composed
//! initiator: it runs the operation with the first try's context and, on
//! error, asks the try for a successor until the operation succeeds or the
//! strategy is exhausted. The caller observes exactly one completion.
//!
//! Strategies must be deterministic given their inputs, and tries are
//! consumed at most once (enforced by `next_try` taking `self`).

use std::collections::VecDeque;
use std::future::Future;

use crate::deadline::TimeConstraint;
use crate::error::{Error, Result};

/// The operation arguments for one attempt.
#[derive(Debug, Clone)]
pub struct TryContext<P> {
    /// Connection provider for this attempt.
    pub provider: P,
    /// Time constraint for this attempt. The framework passes it through
    /// unchanged; adjusting it (e.g. splitting across retries) is the
    /// strategy's job.
    pub time_constraint: TimeConstraint,
}

/// A per-attempt context within the failover framework.
pub trait FailoverTry<P>: Sized {
    /// The operation arguments for this attempt.
    fn context(&self) -> TryContext<P>;

    /// Produce the next try given this attempt's error, or `None` when the
    /// error is not recoverable by this strategy.
    fn next_try(self, err: &Error) -> Option<Self>;
}

/// A pluggable failover strategy.
pub trait FailoverStrategy<P> {
    /// The try type this strategy produces.
    type Try: FailoverTry<P>;

    /// Create the context of the first attempt from the operation's original
    /// arguments.
    fn first_try(&self, provider: &P, t: TimeConstraint) -> Self::Try;
}

/// Run `op` under `strategy`, re-invoking it with successor contexts until
/// success or strategy exhaustion.
///
/// `op` is the wrapped operation initiator: it receives the provider and
/// time constraint of the current try. Unrecovered errors are forwarded
/// verbatim from the last attempt.
pub async fn execute<P, S, Op, Fut, T>(
    strategy: &S,
    provider: P,
    t: TimeConstraint,
    mut op: Op,
) -> Result<T>
where
    S: FailoverStrategy<P>,
    Op: FnMut(P, TimeConstraint) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut current = strategy.first_try(&provider, t);
    loop {
        let TryContext {
            provider,
            time_constraint,
        } = current.context();
        match op(provider, time_constraint).await {
            Ok(value) => return Ok(value),
            Err(err) => match current.next_try(&err) {
                Some(next) => {
                    tracing::debug!(error = %err, "failing over to next try");
                    current = next;
                }
                None => return Err(err),
            },
        }
    }
}

/// Failover across an ordered list of alternate providers.
///
/// The first try runs against the operation's own provider; each subsequent
/// try takes the next alternate. Every try gets the operation's original
/// time constraint, re-resolved from scratch (relative constraints restart;
/// an absolute deadline still binds every attempt).
#[derive(Debug, Clone)]
pub struct FallbackStrategy<P> {
    alternates: Vec<P>,
    should_fail_over: fn(&Error) -> bool,
}

impl<P> FallbackStrategy<P> {
    /// Create a strategy falling over to `alternates` in order, on
    /// transient errors.
    #[must_use]
    pub fn new(alternates: Vec<P>) -> Self {
        Self {
            alternates,
            should_fail_over: Error::is_transient,
        }
    }

    /// Replace the failover predicate.
    #[must_use]
    pub fn fail_over_when(mut self, predicate: fn(&Error) -> bool) -> Self {
        self.should_fail_over = predicate;
        self
    }
}

/// Try produced by [`FallbackStrategy`].
#[derive(Debug)]
pub struct FallbackTry<P> {
    provider: P,
    time_constraint: TimeConstraint,
    remaining: VecDeque<P>,
    should_fail_over: fn(&Error) -> bool,
}

impl<P: Clone + Send + Sync> FailoverTry<P> for FallbackTry<P> {
    fn context(&self) -> TryContext<P> {
        TryContext {
            provider: self.provider.clone(),
            time_constraint: self.time_constraint,
        }
    }

    fn next_try(mut self, err: &Error) -> Option<Self> {
        if !(self.should_fail_over)(err) {
            return None;
        }
        let provider = self.remaining.pop_front()?;
        Some(Self { provider, ..self })
    }
}

impl<P: Clone + Send + Sync> FailoverStrategy<P> for FallbackStrategy<P> {
    type Try = FallbackTry<P>;

    fn first_try(&self, provider: &P, t: TimeConstraint) -> Self::Try {
        FallbackTry {
            provider: provider.clone(),
            time_constraint: t,
            remaining: self.alternates.iter().cloned().collect(),
            should_fail_over: self.should_fail_over,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::Duration;

    fn transport_error() -> Error {
        Error::ConnectPollFailed {
            context: "error while connection polling".into(),
            message: "connection refused".into(),
        }
    }

    #[tokio::test]
    async fn test_fallback_second_provider_succeeds() {
        // First provider always fails with a transport error, second works;
        // the composite completes once, with the second provider's result.
        let strategy = FallbackStrategy::new(vec!["standby"]);
        let calls = Cell::new(0u32);

        let outcome = execute(
            &strategy,
            "primary",
            TimeConstraint::In(Duration::from_secs(1)),
            |provider, _t| {
                calls.set(calls.get() + 1);
                async move {
                    if provider == "primary" {
                        Err(transport_error())
                    } else {
                        Ok(provider)
                    }
                }
            },
        )
        .await;

        assert_eq!(outcome.unwrap(), "standby");
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_fallback_exhaustion_forwards_last_error() {
        let strategy = FallbackStrategy::new(vec!["standby-1", "standby-2"]);
        let calls = Cell::new(0u32);

        let outcome: Result<()> = execute(
            &strategy,
            "primary",
            TimeConstraint::None,
            |_provider, _t| {
                calls.set(calls.get() + 1);
                async { Err(transport_error()) }
            },
        )
        .await;

        assert!(matches!(outcome, Err(Error::ConnectPollFailed { .. })));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_fallback_does_not_recover_terminal_errors() {
        let strategy = FallbackStrategy::new(vec!["standby"]);
        let calls = Cell::new(0u32);

        let outcome: Result<()> =
            execute(&strategy, "primary", TimeConstraint::None, |_p, _t| {
                calls.set(calls.get() + 1);
                async { Err(Error::EmptyQuery) }
            })
            .await;

        assert!(matches!(outcome, Err(Error::EmptyQuery)));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_first_success_skips_the_strategy() {
        let strategy = FallbackStrategy::new(vec!["standby"]);
        let outcome = execute(&strategy, "primary", TimeConstraint::None, |p, _t| async move {
            Ok(p)
        })
        .await;
        assert_eq!(outcome.unwrap(), "primary");
    }
}
