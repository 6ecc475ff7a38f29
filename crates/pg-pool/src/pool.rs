//! Connection pool implementation.
//!
//! All pool state (free list, live count, waiter queue) is serialized by one
//! mutex; every mutation is a short critical section and no lock is held
//! across a suspension point. Hand-off to waiters goes through oneshot
//! channels: a release either passes the freed connection directly to the
//! head waiter or, when the connection is discarded, passes an *open slot*
//! that the waiter fills by connecting fresh.
//!
//! Invariants:
//!
//! - `idle.len() + leased == live <= capacity`
//! - waiters exist only while the free list is empty and `live == capacity`
//! - waiters are served strictly FIFO; at most one waiter is woken per
//!   release
//! - a waiter whose timer fires is removed atomically with its completion:
//!   either the removal wins and the acquisition times out, or the hand-off
//!   wins and the acquisition succeeds

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use pg_client::deadline::with_deadline;
use pg_client::{Connection, ConnectionHandle, ConnectionInfo, ConnectionProvider, TimeConstraint};

use crate::config::PoolConfig;
use crate::error::PoolError;

/// A factory establishing fresh pool connections.
#[async_trait]
pub trait ConnectSource: Send + Sync + 'static {
    /// The connection type this source produces.
    type Conn: PooledItem;

    /// Establish a fresh connection, bounded by `t`.
    async fn connect(&self, t: TimeConstraint) -> Result<Self::Conn, pg_client::Error>;
}

/// A connection the pool can hold.
pub trait PooledItem: Send + 'static {
    /// Whether the connection is still usable at the transport level.
    /// Returning `false` on release makes the pool discard it.
    fn is_alive(&self) -> bool;
}

#[async_trait]
impl ConnectSource for ConnectionInfo {
    type Conn = Connection;

    async fn connect(&self, t: TimeConstraint) -> Result<Connection, pg_client::Error> {
        ConnectionInfo::connect(self, t).await
    }
}

impl PooledItem for Connection {
    fn is_alive(&self) -> bool {
        Connection::is_alive(self)
    }
}

/// What a release hands to a waiter.
enum Handoff<C> {
    /// The freed connection itself.
    Conn(C),
    /// An open capacity slot; the waiter connects fresh within it.
    Slot,
}

struct Waiter<C> {
    id: u64,
    tx: oneshot::Sender<Handoff<C>>,
}

struct IdleConn<C> {
    conn: C,
    since: Instant,
}

struct PoolInner<C> {
    idle: Vec<IdleConn<C>>,
    live: u32,
    waiters: VecDeque<Waiter<C>>,
    next_waiter_id: u64,
    closed: bool,
}

struct Shared<S: ConnectSource> {
    source: S,
    config: PoolConfig,
    inner: Mutex<PoolInner<S::Conn>>,
}

/// The pool over the production connect source.
pub type PgPool = Pool<ConnectionInfo>;

/// A bounded set of reusable connections with a bounded FIFO wait queue.
pub struct Pool<S: ConnectSource> {
    shared: Arc<Shared<S>>,
}

impl<S: ConnectSource> Clone for Pool<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// What `acquire` decided to do while the lock was held.
enum Plan<C> {
    Ready(C),
    Fresh,
    Wait(oneshot::Receiver<Handoff<C>>, u64),
}

impl<S: ConnectSource> Pool<S> {
    /// Create a pool over `source`.
    pub fn new(source: S, config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                source,
                config,
                inner: Mutex::new(PoolInner {
                    idle: Vec::new(),
                    live: 0,
                    waiters: VecDeque::new(),
                    next_waiter_id: 0,
                    closed: false,
                }),
            }),
        })
    }

    /// The pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Acquire a connection, bounded by `t` and the configured timeouts.
    ///
    /// A free connection is returned immediately; otherwise a fresh one is
    /// constructed when a capacity slot is open; otherwise the acquisition
    /// waits in the FIFO queue, failing immediately with
    /// [`PoolError::QueueOverflow`] when the queue is full.
    pub async fn acquire(&self, t: TimeConstraint) -> Result<PooledConnection<S>, PoolError> {
        let t = t.resolve();
        let config = &self.shared.config;

        let plan = {
            let mut inner = self.shared.inner.lock();
            if inner.closed {
                return Err(PoolError::Closed);
            }

            let pruned = Self::prune_stale_locked(&mut inner, config);

            let plan = if let Some(idle) = inner.idle.pop() {
                Plan::Ready(idle.conn)
            } else if inner.live < config.capacity {
                inner.live += 1;
                Plan::Fresh
            } else if inner.waiters.len() < config.queue_capacity as usize {
                let (tx, rx) = oneshot::channel();
                let id = inner.next_waiter_id;
                inner.next_waiter_id += 1;
                inner.waiters.push_back(Waiter { id, tx });
                Plan::Wait(rx, id)
            } else {
                return Err(PoolError::QueueOverflow);
            };
            drop(inner);
            drop(pruned);
            plan
        };

        match plan {
            Plan::Ready(conn) => {
                tracing::trace!("acquired idle connection from pool");
                Ok(self.lease(conn))
            }
            Plan::Fresh => self.connect_fresh(t).await,
            Plan::Wait(rx, id) => self.wait_for_handoff(rx, id, t).await,
        }
    }

    /// Stale idles free their slots; connections are dropped after unlock.
    fn prune_stale_locked(inner: &mut PoolInner<S::Conn>, config: &PoolConfig) -> Vec<S::Conn> {
        let now = Instant::now();
        let mut pruned = Vec::new();
        let mut kept = Vec::with_capacity(inner.idle.len());
        for idle in inner.idle.drain(..) {
            if now.duration_since(idle.since) >= config.idle_timeout {
                pruned.push(idle.conn);
            } else {
                kept.push(idle);
            }
        }
        inner.idle = kept;
        inner.live -= pruned.len() as u32;
        if !pruned.is_empty() {
            tracing::trace!(count = pruned.len(), "discarding stale idle connections");
        }
        pruned
    }

    /// Fill a capacity slot already accounted to this acquisition.
    async fn connect_fresh(&self, t: TimeConstraint) -> Result<PooledConnection<S>, PoolError> {
        let bound = t.tightened_by(self.shared.config.connect_timeout);
        match self.shared.source.connect(bound).await {
            Ok(conn) => {
                tracing::trace!("constructed fresh pool connection");
                Ok(self.lease(conn))
            }
            Err(e) => {
                self.relinquish_slot();
                Err(PoolError::Source(e))
            }
        }
    }

    async fn wait_for_handoff(
        &self,
        mut rx: oneshot::Receiver<Handoff<S::Conn>>,
        id: u64,
        t: TimeConstraint,
    ) -> Result<PooledConnection<S>, PoolError> {
        let bound = t.tightened_by(self.shared.config.queue_timeout);
        let outcome = with_deadline(bound.deadline(), &mut rx).await;
        match outcome {
            Ok(Ok(Handoff::Conn(conn))) => Ok(self.lease(conn)),
            Ok(Ok(Handoff::Slot)) => self.connect_fresh(t).await,
            Ok(Err(_closed)) => Err(PoolError::Closed),
            Err(_expired) => {
                // Timer fired; removal must be atomic with completion. If the
                // hand-off already happened, the hand-off wins.
                let removed = {
                    let mut inner = self.shared.inner.lock();
                    let before = inner.waiters.len();
                    inner.waiters.retain(|w| w.id != id);
                    inner.waiters.len() != before
                };
                if removed {
                    return Err(PoolError::AcquireTimeout);
                }
                match rx.try_recv() {
                    Ok(Handoff::Conn(conn)) => Ok(self.lease(conn)),
                    Ok(Handoff::Slot) => self.connect_fresh(t).await,
                    Err(_) => Err(PoolError::Closed),
                }
            }
        }
    }

    fn lease(&self, conn: S::Conn) -> PooledConnection<S> {
        PooledConnection {
            pool: self.clone(),
            conn: Some(conn),
        }
    }

    /// Return a leased connection.
    fn release(&self, conn: S::Conn) {
        let discard = {
            let mut inner = self.shared.inner.lock();
            if inner.closed {
                inner.live -= 1;
                Some(conn)
            } else if conn.is_alive() {
                match Self::hand_over_locked(&mut inner, conn) {
                    Some(conn) => {
                        inner.idle.push(IdleConn {
                            conn,
                            since: Instant::now(),
                        });
                        tracing::trace!("returned connection to pool");
                        None
                    }
                    None => {
                        tracing::trace!("handed released connection to waiter");
                        None
                    }
                }
            } else {
                tracing::warn!("discarding bad connection on release");
                Self::free_slot_locked(&mut inner);
                Some(conn)
            }
        };
        drop(discard);
    }

    /// Give up a slot accounted to a failed fresh-connect.
    fn relinquish_slot(&self) {
        let mut inner = self.shared.inner.lock();
        Self::free_slot_locked(&mut inner);
    }

    /// Pass `conn` to the head waiter; gives it back when nobody waits.
    /// Waiters that abandoned their acquisition are skipped.
    fn hand_over_locked(inner: &mut PoolInner<S::Conn>, mut conn: S::Conn) -> Option<S::Conn> {
        while let Some(waiter) = inner.waiters.pop_front() {
            match waiter.tx.send(Handoff::Conn(conn)) {
                Ok(()) => return None,
                Err(Handoff::Conn(back)) => conn = back,
                Err(Handoff::Slot) => unreachable!("sender returns what was sent"),
            }
        }
        Some(conn)
    }

    /// Decrement `live` and offer the open slot to the head waiter.
    fn free_slot_locked(inner: &mut PoolInner<S::Conn>) {
        inner.live -= 1;
        while let Some(waiter) = inner.waiters.pop_front() {
            inner.live += 1;
            if waiter.tx.send(Handoff::Slot).is_ok() {
                return;
            }
            inner.live -= 1;
        }
    }

    /// Snapshot of the pool's state.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let inner = self.shared.inner.lock();
        PoolStatus {
            available: inner.idle.len() as u32,
            in_use: inner.live - inner.idle.len() as u32,
            total: inner.live,
            max: self.shared.config.capacity,
            waiting: inner.waiters.len() as u32,
        }
    }

    /// Close the pool.
    ///
    /// Idle connections are dropped, pending waiters fail with
    /// [`PoolError::Closed`], and subsequent acquisitions are refused.
    /// Connections still leased are discarded when released.
    pub fn close(&self) {
        let (idles, waiters) = {
            let mut inner = self.shared.inner.lock();
            inner.closed = true;
            inner.live -= inner.idle.len() as u32;
            let idles = std::mem::take(&mut inner.idle);
            let waiters = std::mem::take(&mut inner.waiters);
            (idles, waiters)
        };
        // Dropping the senders completes every waiter with Closed.
        drop(waiters);
        drop(idles);
        tracing::debug!("connection pool closed");
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.inner.lock().closed
    }

    /// A [`ConnectionProvider`] view of this pool using the configured
    /// timeouts.
    #[must_use]
    pub fn provider(&self) -> PoolProvider<S> {
        PoolProvider { pool: self.clone() }
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: u32,
    /// Number of connections currently leased.
    pub in_use: u32,
    /// Total number of connections, idle and leased.
    pub total: u32,
    /// Maximum allowed connections.
    pub max: u32,
    /// Number of queued acquisitions.
    pub waiting: u32,
}

/// A connection leased from the pool.
///
/// Dropping the lease returns the connection: back to the free list when it
/// is alive, discarded otherwise (with its slot offered to the next waiter).
pub struct PooledConnection<S: ConnectSource> {
    pool: Pool<S>,
    conn: Option<S::Conn>,
}

impl<S: ConnectSource> PooledConnection<S> {
    /// Detach the connection from the pool.
    ///
    /// The pool's slot is freed; the connection will not be returned.
    #[must_use]
    pub fn detach(mut self) -> S::Conn {
        let conn = self.conn.take().expect("pooled connection already released");
        self.pool.relinquish_slot();
        conn
    }
}

impl<S: ConnectSource> std::ops::Deref for PooledConnection<S> {
    type Target = S::Conn;

    fn deref(&self) -> &S::Conn {
        self.conn
            .as_ref()
            .expect("pooled connection already released")
    }
}

impl<S: ConnectSource> std::ops::DerefMut for PooledConnection<S> {
    fn deref_mut(&mut self) -> &mut S::Conn {
        self.conn
            .as_mut()
            .expect("pooled connection already released")
    }
}

impl<S: ConnectSource> Drop for PooledConnection<S> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

impl<S: ConnectSource<Conn = Connection>> ConnectionHandle for PooledConnection<S> {
    fn conn(&self) -> &Connection {
        self
    }

    fn conn_mut(&mut self) -> &mut Connection {
        self
    }
}

/// Pool-backed connection provider.
pub struct PoolProvider<S: ConnectSource> {
    pool: Pool<S>,
}

impl<S: ConnectSource> Clone for PoolProvider<S> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

#[async_trait]
impl<S: ConnectSource<Conn = Connection>> ConnectionProvider for PoolProvider<S> {
    type Handle = PooledConnection<S>;

    async fn get(&self, t: TimeConstraint) -> Result<Self::Handle, pg_client::Error> {
        self.pool.acquire(t).await.map_err(Into::into)
    }
}
