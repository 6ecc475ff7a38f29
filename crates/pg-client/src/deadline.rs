//! Operation time constraints.
//!
//! Every pipeline operation takes a [`TimeConstraint`]: no bound, an
//! absolute deadline, or a relative duration. A relative constraint is
//! resolved to an absolute deadline once, at operation entry, so that all
//! phases of a composite operation (acquire, send, receive) share one bound.

use std::future::Future;
use std::time::{Duration, Instant};

/// The bound on how long an operation may remain pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeConstraint {
    /// No bound; the operation may wait indefinitely.
    None,
    /// An absolute deadline.
    At(Instant),
    /// A duration relative to operation entry.
    In(Duration),
}

impl TimeConstraint {
    /// Resolve a relative constraint against the current instant.
    ///
    /// Idempotent for `None` and `At` constraints.
    #[must_use]
    pub fn resolve(self) -> TimeConstraint {
        match self {
            TimeConstraint::In(d) => TimeConstraint::At(Instant::now() + d),
            other => other,
        }
    }

    /// The absolute deadline of this constraint, if it has one.
    #[must_use]
    pub fn deadline(self) -> Option<Instant> {
        match self {
            TimeConstraint::None => None,
            TimeConstraint::At(at) => Some(at),
            TimeConstraint::In(d) => Some(Instant::now() + d),
        }
    }

    /// Whether this constraint imposes no bound.
    #[must_use]
    pub fn is_none(self) -> bool {
        matches!(self, TimeConstraint::None)
    }

    /// Split the remaining time evenly across `n` tries.
    ///
    /// Used by retry strategies: each try gets its proportional share of
    /// whatever time is left. `n == 0` yields a zero-duration constraint.
    #[must_use]
    pub fn divided_by(self, n: u32) -> TimeConstraint {
        match self {
            TimeConstraint::None => TimeConstraint::None,
            TimeConstraint::In(d) => TimeConstraint::In(checked_div(d, n)),
            TimeConstraint::At(at) => {
                let left = at.saturating_duration_since(Instant::now());
                TimeConstraint::In(checked_div(left, n))
            }
        }
    }

    /// The tighter of this constraint and `now + bound`.
    #[must_use]
    pub fn tightened_by(self, bound: Duration) -> TimeConstraint {
        let capped = Instant::now() + bound;
        match self.deadline() {
            Some(at) if at <= capped => TimeConstraint::At(at),
            _ => TimeConstraint::At(capped),
        }
    }
}

fn checked_div(d: Duration, n: u32) -> Duration {
    if n == 0 {
        Duration::ZERO
    } else {
        d / n
    }
}

/// Marker returned when a deadline expires before the awaited future
/// completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineExpired;

/// Await `fut`, bounded by an optional absolute deadline.
///
/// On expiry the future is dropped, which cancels whatever suspension it was
/// parked on; nothing keeps running past the bound.
pub async fn with_deadline<F: Future>(
    deadline: Option<Instant>,
    fut: F,
) -> std::result::Result<F::Output, DeadlineExpired> {
    match deadline {
        None => Ok(fut.await),
        Some(at) => tokio::time::timeout_at(tokio::time::Instant::from_std(at), fut)
            .await
            .map_err(|_| DeadlineExpired),
    }
}
