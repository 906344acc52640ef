//! # Connection Pool
//!
//! Purpose: Share a bounded set of backend connections between threads,
//! growing lazily and waiting (up to a deadline) when saturated.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse connection handles instead of rebuilding them.
//! 2. **Minimal Locking**: The mutex guards only the idle deque and the counter;
//!    connect and dial run outside it.
//! 3. **Bounded Wait**: A saturated checkout parks on a condvar until a member
//!    comes back or the deadline passes.
//! 4. **Scoped Release**: `PooledConnection` returns its member on drop, so
//!    every exit path releases exactly once.
//!
//! ## Invariant
//!
//! `idle.len() <= total <= capacity`, where `total` counts idle members,
//! checked-out members, and slots reserved for connections being created.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::backend::{BackendConnection, Connector};
use crate::error::{ClientError, ClientResult};

/// Pool sizing and wait policy.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections, idle plus checked out.
    pub capacity: usize,
    /// Default wait for `acquire`.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            capacity: 20,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Configured capacity.
    pub capacity: usize,
    /// Members that exist or are being created.
    pub total: usize,
    /// Members parked in the pool.
    pub idle: usize,
}

impl PoolStatus {
    /// Members currently held by callers.
    pub fn in_use(&self) -> usize {
        self.total - self.idle
    }
}

/// Outcome of taking a member out of the pool.
enum Checkout<T> {
    /// An idle member was available.
    Member(T),
    /// Nothing idle, but a slot was reserved for a new member.
    Empty,
    /// The pool could not hand anything out.
    Failed(ClientError),
}

struct PoolState<T> {
    idle: VecDeque<T>,
    total: usize,
}

struct PoolInner<C: Connector> {
    connector: C,
    config: PoolConfig,
    state: Mutex<PoolState<C::Conn>>,
    available: Condvar,
}

impl<C: Connector> PoolInner<C> {
    fn return_member(&self, conn: C::Conn) {
        let mut state = self.state.lock();
        state.idle.push_back(conn);
        drop(state);
        self.available.notify_one();
    }

    fn release_slot(&self) {
        let mut state = self.state.lock();
        state.total = state.total.saturating_sub(1);
        drop(state);
        self.available.notify_one();
    }
}

/// Connection pool handle. Clones share the same members.
pub struct ConnectionPool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connector> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        ConnectionPool {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> ConnectionPool<C> {
    /// Creates an empty pool. Members are created on demand.
    ///
    /// # Errors
    /// Returns `ClientError::InvalidConfig` when `capacity` is zero.
    pub fn new(connector: C, config: PoolConfig) -> ClientResult<Self> {
        if config.capacity == 0 {
            return Err(ClientError::InvalidConfig(
                "pool capacity must be at least 1".to_string(),
            ));
        }
        let state = PoolState {
            idle: VecDeque::with_capacity(config.capacity),
            total: 0,
        };
        Ok(ConnectionPool {
            inner: Arc::new(PoolInner {
                connector,
                config,
                state: Mutex::new(state),
                available: Condvar::new(),
            }),
        })
    }

    /// Acquires a dialed connection, waiting up to the configured timeout.
    pub fn acquire(&self) -> ClientResult<PooledConnection<C>> {
        self.acquire_timeout(self.inner.config.acquire_timeout)
    }

    /// Acquires a dialed connection, waiting up to `timeout`.
    ///
    /// **Logic**:
    /// 1. Take an idle member, or reserve a slot if below capacity, or wait.
    /// 2. On a reserved slot, ask the connector for a new member.
    /// 3. Dial the member regardless of where it came from.
    ///
    /// # Errors
    /// `PoolExhausted` when the deadline passes; connect or dial errors
    /// otherwise. The slot is freed on every error path.
    pub fn acquire_timeout(&self, timeout: Duration) -> ClientResult<PooledConnection<C>> {
        let mut conn = match self.checkout(timeout) {
            Checkout::Member(conn) => conn,
            Checkout::Empty => match self.inner.connector.connect() {
                Ok(conn) => {
                    debug!(total = self.status().total, "registered new pool member");
                    conn
                }
                Err(err) => {
                    self.inner.release_slot();
                    return Err(err);
                }
            },
            Checkout::Failed(err) => return Err(err),
        };

        if let Err(err) = conn.dial() {
            warn!(error = %err, "dial failed, discarding pool member");
            self.inner.release_slot();
            return Err(err);
        }

        Ok(PooledConnection::new(Arc::clone(&self.inner), conn))
    }

    /// Returns current pool counters.
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            capacity: self.inner.config.capacity,
            total: state.total,
            idle: state.idle.len(),
        }
    }

    fn checkout(&self, timeout: Duration) -> Checkout<C::Conn> {
        // `None` when the timeout is too large to represent: wait without a deadline.
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.inner.state.lock();
        loop {
            if let Some(conn) = state.idle.pop_front() {
                return Checkout::Member(conn);
            }
            if state.total < self.inner.config.capacity {
                state.total += 1;
                return Checkout::Empty;
            }
            // Spurious wakeups and lost races just loop back to the checks.
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        debug!(capacity = self.inner.config.capacity, "pool saturated past deadline");
                        return Checkout::Failed(ClientError::PoolExhausted { waited: timeout });
                    }
                    self.inner.available.wait_until(&mut state, deadline);
                }
                None => self.inner.available.wait(&mut state),
            }
        }
    }
}

/// RAII guard over a checked-out connection.
///
/// Dropping the guard returns the member to the pool, or discards it when a
/// wire-level failure left the session in an unknown state.
pub struct PooledConnection<C: Connector> {
    pool: Arc<PoolInner<C>>,
    conn: Option<C::Conn>,
    valid: bool,
}

impl<C: Connector> PooledConnection<C> {
    fn new(pool: Arc<PoolInner<C>>, conn: C::Conn) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            valid: true,
        }
    }

    /// Runs `op` against the underlying connection.
    ///
    /// Wire failures mark the connection invalid so it is not reused.
    pub fn with<R>(&mut self, op: impl FnOnce(&mut C::Conn) -> ClientResult<R>) -> ClientResult<R> {
        let conn = self.conn.as_mut().expect("connection present until drop");
        let result = op(conn);
        if let Err(err) = &result {
            if err.poisons_connection() {
                self.valid = false;
            }
        }
        result
    }

    /// Fetches raw object bytes.
    pub fn fetch_object(&mut self, bucket: &str, key: &str) -> ClientResult<Vec<u8>> {
        self.with(|conn| conn.fetch_object(bucket, key))
    }

    /// Stores raw object bytes.
    pub fn store_object(&mut self, bucket: &str, key: &str, value: &[u8]) -> ClientResult<()> {
        self.with(|conn| conn.store_object(bucket, key, value))
    }

    /// Deletes an object.
    pub fn delete_object(&mut self, bucket: &str, key: &str) -> ClientResult<()> {
        self.with(|conn| conn.delete_object(bucket, key))
    }

    /// Pings the backend.
    pub fn ping(&mut self) -> ClientResult<()> {
        self.with(|conn| conn.ping())
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };

        if self.valid {
            self.pool.return_member(conn);
        } else {
            debug!("discarding poisoned connection");
            drop(conn);
            self.pool.release_slot();
        }
    }
}
