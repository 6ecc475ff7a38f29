//! Pool invariant tests.
//!
//! These run against a mock connect source, so no database is needed: they
//! exercise the pool's accounting, queueing and timeout behavior directly.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use pg_client::TimeConstraint;
use pg_driver_pool::{ConnectSource, Pool, PoolConfig, PoolError, PooledItem};

struct MockConn {
    id: u32,
    alive: Arc<AtomicBool>,
}

impl PooledItem for MockConn {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Default)]
struct MockSource {
    connects: Arc<AtomicU32>,
    fail: Arc<AtomicBool>,
}

#[async_trait]
impl ConnectSource for MockSource {
    type Conn = MockConn;

    async fn connect(&self, _t: TimeConstraint) -> Result<MockConn, pg_client::Error> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(pg_client::Error::Connection("mock connect refused".into()));
        }
        let id = self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MockConn {
            id,
            alive: Arc::new(AtomicBool::new(true)),
        })
    }
}

fn pool(config: PoolConfig) -> Pool<MockSource> {
    Pool::new(MockSource::default(), config).expect("valid config")
}

// =============================================================================
// Capacity and accounting
// =============================================================================

#[tokio::test]
async fn test_leases_never_exceed_capacity() {
    let pool = pool(PoolConfig::new().capacity(2).queue_capacity(64));
    let held = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let pool = pool.clone();
        let held = Arc::clone(&held);
        let peak = Arc::clone(&peak);
        tasks.push(tokio::spawn(async move {
            let lease = pool.acquire(TimeConstraint::None).await.expect("acquire");
            let now = held.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            held.fetch_sub(1, Ordering::SeqCst);
            drop(lease);
        }));
    }
    for task in tasks {
        task.await.expect("task");
    }

    assert!(peak.load(Ordering::SeqCst) <= 2);
    let status = pool.status();
    assert_eq!(status.in_use, 0);
    assert!(status.total <= 2);
}

#[tokio::test]
async fn test_idle_connection_is_reused() {
    let source = MockSource::default();
    let connects = Arc::clone(&source.connects);
    let pool = Pool::new(source, PoolConfig::new().capacity(2)).expect("valid config");

    let first = pool.acquire(TimeConstraint::None).await.expect("acquire");
    let first_id = first.id;
    drop(first);

    let second = pool.acquire(TimeConstraint::None).await.expect("acquire");
    assert_eq!(second.id, first_id);
    assert_eq!(connects.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Queue ordering and overflow
// =============================================================================

#[tokio::test]
async fn test_zero_queue_overflows_immediately() {
    let pool = pool(PoolConfig::new().capacity(1).queue_capacity(0));

    let held = pool.acquire(TimeConstraint::None).await.expect("acquire");
    let outcome = pool
        .acquire(TimeConstraint::In(Duration::from_secs(1)))
        .await;

    assert!(matches!(outcome, Err(PoolError::QueueOverflow)));
    drop(held);
}

#[tokio::test]
async fn test_queue_overflow_beyond_capacity() {
    let pool = pool(PoolConfig::new().capacity(1).queue_capacity(1));

    let held = pool.acquire(TimeConstraint::None).await.expect("acquire");

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire(TimeConstraint::None).await })
    };
    while pool.status().waiting < 1 {
        tokio::task::yield_now().await;
    }

    // Queue is full now; the next acquisition is refused outright.
    let outcome = pool.acquire(TimeConstraint::None).await;
    assert!(matches!(outcome, Err(PoolError::QueueOverflow)));

    drop(held);
    let lease = waiter.await.expect("task").expect("waiter served");
    drop(lease);
}

#[tokio::test]
async fn test_waiters_are_served_in_fifo_order() {
    let pool = pool(PoolConfig::new().capacity(1).queue_capacity(2));
    let order = Arc::new(Mutex::new(Vec::new()));

    let held = pool.acquire(TimeConstraint::None).await.expect("acquire");

    let spawn_waiter = |name: &'static str| {
        let pool = pool.clone();
        let order = Arc::clone(&order);
        tokio::spawn(async move {
            let lease = pool.acquire(TimeConstraint::None).await.expect("served");
            order.lock().push(name);
            lease
        })
    };

    let waiter_b = spawn_waiter("b");
    while pool.status().waiting < 1 {
        tokio::task::yield_now().await;
    }
    let waiter_c = spawn_waiter("c");
    while pool.status().waiting < 2 {
        tokio::task::yield_now().await;
    }

    drop(held);
    let lease_b = waiter_b.await.expect("task");
    assert_eq!(*order.lock(), vec!["b"]);
    assert_eq!(pool.status().waiting, 1, "c remains queued");

    drop(lease_b);
    let lease_c = waiter_c.await.expect("task");
    assert_eq!(*order.lock(), vec!["b", "c"]);
    drop(lease_c);
}

// =============================================================================
// Waiter timeout
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_waiter_times_out() {
    let pool = pool(PoolConfig::new().capacity(1).queue_capacity(8));

    let held = pool.acquire(TimeConstraint::None).await.expect("acquire");
    let outcome = pool
        .acquire(TimeConstraint::In(Duration::from_millis(50)))
        .await;

    assert!(matches!(outcome, Err(PoolError::AcquireTimeout)));
    assert_eq!(pool.status().waiting, 0, "timed-out waiter was removed");

    // The pool still serves after a waiter expired.
    drop(held);
    let lease = pool.acquire(TimeConstraint::None).await.expect("acquire");
    drop(lease);
}

#[tokio::test(start_paused = true)]
async fn test_queue_timeout_config_bounds_the_wait() {
    let pool = pool(
        PoolConfig::new()
            .capacity(1)
            .queue_capacity(8)
            .queue_timeout(Duration::from_millis(20)),
    );

    let held = pool.acquire(TimeConstraint::None).await.expect("acquire");
    // No caller bound at all: the configured queue timeout still applies.
    let outcome = pool.acquire(TimeConstraint::None).await;
    assert!(matches!(outcome, Err(PoolError::AcquireTimeout)));
    drop(held);
}

// =============================================================================
// Release, discard, slot hand-off
// =============================================================================

#[tokio::test]
async fn test_bad_connection_is_discarded_on_release() {
    let pool = pool(PoolConfig::new().capacity(1));

    let lease = pool.acquire(TimeConstraint::None).await.expect("acquire");
    let first_id = lease.id;
    lease.alive.store(false, Ordering::SeqCst);
    drop(lease);

    let status = pool.status();
    assert_eq!(status.total, 0, "dead connection freed its slot");

    let fresh = pool.acquire(TimeConstraint::None).await.expect("acquire");
    assert_ne!(fresh.id, first_id);
    drop(fresh);
}

#[tokio::test]
async fn test_waiter_receives_open_slot_when_bad_connection_released() {
    let pool = pool(PoolConfig::new().capacity(1).queue_capacity(1));

    let held = pool.acquire(TimeConstraint::None).await.expect("acquire");
    let held_id = held.id;

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire(TimeConstraint::None).await })
    };
    while pool.status().waiting < 1 {
        tokio::task::yield_now().await;
    }

    held.alive.store(false, Ordering::SeqCst);
    drop(held);

    let lease = waiter.await.expect("task").expect("served with fresh slot");
    assert_ne!(lease.id, held_id, "waiter connected fresh within the slot");
    assert_eq!(pool.status().total, 1);
    drop(lease);
}

#[tokio::test]
async fn test_abandoned_waiter_is_skipped() {
    let pool = pool(PoolConfig::new().capacity(1).queue_capacity(2));

    let held = pool.acquire(TimeConstraint::None).await.expect("acquire");

    let abandoned = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire(TimeConstraint::None).await })
    };
    while pool.status().waiting < 1 {
        tokio::task::yield_now().await;
    }
    abandoned.abort();
    let _ = abandoned.await;

    let survivor = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire(TimeConstraint::None).await })
    };
    while pool.status().waiting < 2 {
        tokio::task::yield_now().await;
    }

    drop(held);
    let lease = survivor.await.expect("task").expect("served past dead waiter");
    drop(lease);
}

#[tokio::test]
async fn test_failed_connect_relinquishes_the_slot() {
    let source = MockSource::default();
    source.fail.store(true, Ordering::SeqCst);
    let pool = Pool::new(source, PoolConfig::new().capacity(1)).expect("valid config");

    let outcome = pool.acquire(TimeConstraint::None).await;
    assert!(matches!(outcome, Err(PoolError::Source(_))));
    assert_eq!(pool.status().total, 0, "slot was given back");
}

// =============================================================================
// Stale idle connections
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_stale_idle_connection_is_replaced() {
    let pool = pool(
        PoolConfig::new()
            .capacity(1)
            .idle_timeout(Duration::from_secs(5)),
    );

    let first = pool.acquire(TimeConstraint::None).await.expect("acquire");
    let first_id = first.id;
    drop(first);

    tokio::time::advance(Duration::from_secs(6)).await;

    let second = pool.acquire(TimeConstraint::None).await.expect("acquire");
    assert_ne!(second.id, first_id, "stale connection was rebuilt");
    assert_eq!(pool.status().total, 1);
    drop(second);
}

// =============================================================================
// Close
// =============================================================================

#[tokio::test]
async fn test_close_fails_pending_waiters() {
    let pool = pool(PoolConfig::new().capacity(1).queue_capacity(4));

    let held = pool.acquire(TimeConstraint::None).await.expect("acquire");
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire(TimeConstraint::None).await })
    };
    while pool.status().waiting < 1 {
        tokio::task::yield_now().await;
    }

    pool.close();
    assert!(pool.is_closed());

    let outcome = waiter.await.expect("task");
    assert!(matches!(outcome, Err(PoolError::Closed)));

    let refused = pool.acquire(TimeConstraint::None).await;
    assert!(matches!(refused, Err(PoolError::Closed)));

    drop(held);
    assert_eq!(pool.status().total, 0);
}

#[tokio::test]
async fn test_detach_frees_the_slot() {
    let pool = pool(PoolConfig::new().capacity(1));

    let lease = pool.acquire(TimeConstraint::None).await.expect("acquire");
    let conn = lease.detach();
    assert_eq!(pool.status().total, 0);

    // The slot is free again for someone else.
    let lease = pool.acquire(TimeConstraint::None).await.expect("acquire");
    drop(lease);
    drop(conn);
}
