//! Bounded connection pool shared by the metadata probe and partition workers.
//!
//! Connections are opened lazily, up to `max_size`. A failed connect is
//! reported to the caller straight away; there is no background retry.
//! Callers beyond `max_size` wait up to `acquire_timeout` for a release.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use r2d2::ManageConnection;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ConectaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    pub max_size: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_size: 1,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub max_size: u32,
    pub open: usize,
    pub idle: usize,
}

struct PoolState<C> {
    idle: Vec<C>,
    open: usize,
}

struct PoolInner<M: ManageConnection> {
    manager: M,
    options: PoolOptions,
    state: Mutex<PoolState<M::Connection>>,
    condvar: Condvar,
}

impl<M: ManageConnection> PoolInner<M> {
    fn lock(&self) -> MutexGuard<'_, PoolState<M::Connection>> {
        // Pool bookkeeping stays consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self, mut conn: M::Connection) {
        let broken = self.manager.has_broken(&mut conn);
        let mut state = self.lock();
        if broken {
            warn!("dropping broken pooled connection");
            state.open = state.open.saturating_sub(1);
            drop(state);
            drop(conn);
        } else {
            state.idle.push(conn);
            drop(state);
        }
        self.condvar.notify_one();
    }
}

/// Pool over any r2d2 connection manager.
pub struct ConnectionPool<M: ManageConnection> {
    inner: Arc<PoolInner<M>>,
}

impl<M: ManageConnection> Clone for ConnectionPool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: ManageConnection> ConnectionPool<M> {
    pub fn new(manager: M, options: PoolOptions) -> Result<Self> {
        if options.max_size == 0 {
            return Err(ConectaError::config("pool max_size must be greater than 0"));
        }
        Ok(Self {
            inner: Arc::new(PoolInner {
                manager,
                options,
                state: Mutex::new(PoolState {
                    idle: Vec::new(),
                    open: 0,
                }),
                condvar: Condvar::new(),
            }),
        })
    }

    pub fn options(&self) -> PoolOptions {
        self.inner.options
    }

    pub fn manager(&self) -> &M {
        &self.inner.manager
    }

    /// Check out a connection, opening one if the pool is below capacity.
    pub fn get(&self) -> Result<PooledConnection<M>> {
        let inner = &self.inner;
        let PoolOptions {
            max_size,
            acquire_timeout,
        } = inner.options;
        let deadline = Instant::now() + acquire_timeout;
        let mut state = inner.lock();

        loop {
            if let Some(conn) = state.idle.pop() {
                return Ok(self.wrap(conn));
            }

            if state.open < max_size as usize {
                state.open += 1;
                drop(state);
                return match inner.manager.connect() {
                    Ok(conn) => {
                        debug!(max_size, "opened pooled connection");
                        Ok(self.wrap(conn))
                    }
                    Err(err) => {
                        inner.lock().open -= 1;
                        inner.condvar.notify_one();
                        Err(ConectaError::Connection(err.to_string()))
                    }
                };
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ConectaError::Connection(format!(
                    "timed out waiting for a pooled connection (max_size={max_size}, timeout={}s)",
                    acquire_timeout.as_secs_f64()
                )));
            }
            let (guard, _) = inner
                .condvar
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state = guard;
        }
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.inner.lock();
        PoolStatus {
            max_size: self.inner.options.max_size,
            open: state.open,
            idle: state.idle.len(),
        }
    }

    fn wrap(&self, conn: M::Connection) -> PooledConnection<M> {
        PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
        }
    }
}

/// Connection checked out of a [`ConnectionPool`]; returned on drop.
pub struct PooledConnection<M: ManageConnection> {
    conn: Option<M::Connection>,
    pool: Arc<PoolInner<M>>,
}

impl<M: ManageConnection> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl<M: ManageConnection> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<M: ManageConnection> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    #[derive(Debug)]
    struct TestError(&'static str);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    impl std::error::Error for TestError {}

    #[derive(Default)]
    struct CountingManager {
        opened: AtomicUsize,
        refuse: AtomicBool,
        broken: AtomicBool,
    }

    impl ManageConnection for CountingManager {
        type Connection = usize;
        type Error = TestError;

        fn connect(&self) -> std::result::Result<usize, TestError> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(TestError("connection refused"));
            }
            Ok(self.opened.fetch_add(1, Ordering::SeqCst))
        }

        fn is_valid(&self, _conn: &mut usize) -> std::result::Result<(), TestError> {
            Ok(())
        }

        fn has_broken(&self, _conn: &mut usize) -> bool {
            self.broken.load(Ordering::SeqCst)
        }
    }

    fn pool(max_size: u32, timeout_ms: u64) -> ConnectionPool<CountingManager> {
        ConnectionPool::new(
            CountingManager::default(),
            PoolOptions {
                max_size,
                acquire_timeout: Duration::from_millis(timeout_ms),
            },
        )
        .unwrap()
    }

    #[test]
    fn reuses_released_connections() {
        let pool = pool(2, 100);
        let first = *pool.get().unwrap();
        let second = *pool.get().unwrap();
        assert_eq!(first, second);
        assert_eq!(pool.manager().opened.load(Ordering::SeqCst), 1);
        assert_eq!(
            pool.status(),
            PoolStatus {
                max_size: 2,
                open: 1,
                idle: 1
            }
        );
    }

    #[test]
    fn never_opens_more_than_max_size() {
        let pool = pool(2, 50);
        let a = pool.get().unwrap();
        let b = pool.get().unwrap();
        assert_ne!(*a, *b);
        let err = pool.get().err().unwrap();
        assert!(matches!(err, ConectaError::Connection(msg) if msg.contains("timed out")));
        assert_eq!(pool.status().open, 2);
    }

    #[test]
    fn waiter_gets_released_connection() {
        let pool = pool(1, 2_000);
        let held = pool.get().unwrap();
        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || *pool.get().unwrap())
        };
        thread::sleep(Duration::from_millis(20));
        drop(held);
        assert_eq!(waiter.join().unwrap(), 0);
        assert_eq!(pool.manager().opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn connect_failure_is_reported_and_frees_the_slot() {
        let pool = pool(1, 50);
        pool.manager().refuse.store(true, Ordering::SeqCst);
        let err = pool.get().err().unwrap();
        assert!(matches!(err, ConectaError::Connection(msg) if msg == "connection refused"));
        assert_eq!(pool.status().open, 0);

        pool.manager().refuse.store(false, Ordering::SeqCst);
        assert!(pool.get().is_ok());
    }

    #[test]
    fn broken_connections_are_discarded() {
        let pool = pool(1, 50);
        pool.manager().broken.store(true, Ordering::SeqCst);
        drop(pool.get().unwrap());
        assert_eq!(pool.status().open, 0);
        assert_eq!(pool.status().idle, 0);
    }

    #[test]
    fn rejects_zero_max_size() {
        let result = ConnectionPool::new(CountingManager::default(), PoolOptions {
            max_size: 0,
            acquire_timeout: Duration::from_secs(1),
        });
        assert!(matches!(result, Err(ConectaError::Config(_))));
    }
}
