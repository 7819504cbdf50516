//! A bounded pool of [`Connection`]s.
//!
//! All bookkeeping lives in one [`PoolState`] behind a `std::sync::Mutex`.
//! The lock is never held across an `.await`: dialing happens outside it
//! against a reserved slot, and waiters park on a [`Notify`] that every
//! release signals.
//!
//! `active` counts every connection that exists on behalf of the pool
//! (idle, checked out, or being dialed), so `active <= max_active` and
//! `idle.len() <= max_idle` hold at every observation point.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::core::connection::Connection;
use crate::core::dialer::Connect;
use crate::proto::error::{Error, Result};

/// Capacity and waiting policy of a [`Pool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound on cached idle connections.
    pub max_idle: usize,
    /// Upper bound on connections that exist at once, idle and checked out
    /// together. `0` means unbounded.
    pub max_active: usize,
    /// Whether `get` waits for a release when the pool is at `max_active`.
    /// When false it fails with [`Error::PoolExhausted`] instead.
    pub wait: bool,
    /// Bound on that wait; `None` waits indefinitely.
    pub wait_timeout: Option<Duration>,
    /// Idle connections older than this are closed instead of reused.
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 80,
            max_active: 12000,
            wait: true,
            wait_timeout: None,
            idle_timeout: None,
        }
    }
}

/// A snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Connections counted against `max_active`: idle, checked out and
    /// being dialed.
    pub active: usize,
    /// Connections sitting in the idle set.
    pub idle: usize,
}

struct IdleConnection {
    conn: Connection,
    since: Instant,
}

#[derive(Default)]
struct PoolState {
    /// Most recently released first.
    idle: VecDeque<IdleConnection>,
    active: usize,
    closed: bool,
}

impl PoolState {
    /// Removes idle connections that have outlived `idle_timeout`.
    fn prune(&mut self, idle_timeout: Option<Duration>) -> Vec<Connection> {
        let Some(timeout) = idle_timeout else {
            return Vec::new();
        };
        let mut stale = Vec::new();
        while let Some(oldest) = self.idle.back() {
            if oldest.since.elapsed() < timeout {
                break;
            }
            if let Some(entry) = self.idle.pop_back() {
                self.active -= 1;
                stale.push(entry.conn);
            }
        }
        stale
    }
}

struct PoolInner {
    config: PoolConfig,
    connector: Box<dyn Connect>,
    state: Mutex<PoolState>,
    available: Notify,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn has_capacity(&self, state: &PoolState) -> bool {
        self.config.max_active == 0 || state.active < self.config.max_active
    }
}

/// What `acquire` decided to do while holding the lock.
enum Step {
    Reuse(Connection),
    Dial,
    Wait,
}

/// A slot reserved for a dial in progress. Dropping it without calling
/// [`keep`](Reservation::keep) gives the slot back.
struct Reservation<'a> {
    inner: &'a PoolInner,
    armed: bool,
}

impl Reservation<'_> {
    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.lock().active -= 1;
            self.inner.available.notify_one();
        }
    }
}

/// A cloneable handle to a connection pool.
///
/// The pool is closed with [`close`](Pool::close), or when the last handle
/// is dropped, which closes every idle connection.
///
/// # Example
///
/// ```no_run
/// use respool::core::command::Cmd;
/// use respool::core::dialer::{Dialer, DialerConfig};
/// use respool::core::pool::{Pool, PoolConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = Pool::new(PoolConfig::default(), Dialer::new(DialerConfig::new("127.0.0.1:6379")));
/// let mut conn = pool.get().await?;
/// let reply = conn.send(&Cmd::new("PING")).await?;
/// println!("{}", reply);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Creates an empty pool that opens connections through `connector`.
    pub fn new<C>(config: PoolConfig, connector: C) -> Self
    where
        C: Connect + 'static,
    {
        Self {
            inner: Arc::new(PoolInner {
                config,
                connector: Box::new(connector),
                state: Mutex::new(PoolState::default()),
                available: Notify::new(),
            }),
        }
    }

    /// The configuration this pool was created with.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Checks a connection out, wrapped in a guard that returns it on drop.
    pub async fn get(&self) -> Result<PooledConnection> {
        let conn = self.acquire().await?;
        Ok(PooledConnection {
            pool: self.clone(),
            conn: Some(conn),
        })
    }

    /// Checks a connection out. The caller must hand it back with
    /// [`release`](Pool::release), or the slot it occupies is lost.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolClosed`] once the pool is closed
    /// - [`Error::PoolExhausted`] when at capacity and `wait` is false
    /// - [`Error::PoolTimeout`] when `wait_timeout` elapses first
    /// - any dial error; the reserved slot is freed before it surfaces
    pub async fn acquire(&self) -> Result<Connection> {
        let inner = &*self.inner;
        let started = Instant::now();
        let deadline = inner.config.wait_timeout.map(|t| started + t);

        loop {
            let notified = inner.available.notified();
            tokio::pin!(notified);

            let (step, stale) = {
                let mut state = inner.lock();
                if state.closed {
                    return Err(Error::PoolClosed);
                }
                let stale = state.prune(inner.config.idle_timeout);
                let step = if let Some(entry) = state.idle.pop_front() {
                    Step::Reuse(entry.conn)
                } else if inner.has_capacity(&state) {
                    state.active += 1;
                    Step::Dial
                } else if !inner.config.wait {
                    return Err(Error::PoolExhausted);
                } else {
                    // Registered under the lock so a release cannot slip
                    // between the capacity check and the wait.
                    notified.as_mut().enable();
                    Step::Wait
                };
                (step, stale)
            };

            if !stale.is_empty() {
                debug!(count = stale.len(), "closing stale idle connections");
                drop(stale);
            }

            match step {
                Step::Reuse(conn) => {
                    debug!(connection = conn.id(), "reusing idle connection");
                    return Ok(conn);
                }
                Step::Dial => {
                    let reservation = Reservation { inner, armed: true };
                    return match inner.connector.connect().await {
                        Ok(conn) => {
                            reservation.keep();
                            debug!(connection = conn.id(), "dialed new connection");
                            Ok(conn)
                        }
                        Err(e) => {
                            warn!(error = %e, "dial failed");
                            Err(e)
                        }
                    };
                }
                Step::Wait => match deadline {
                    Some(deadline) => {
                        if tokio::time::timeout_at(deadline, notified).await.is_err() {
                            return Err(Error::PoolTimeout {
                                waited: started.elapsed(),
                            });
                        }
                    }
                    None => notified.await,
                },
            }
        }
    }

    /// Returns a connection to the pool.
    ///
    /// An unhealthy or broken connection is closed and its slot freed. A
    /// healthy one goes back to the idle set unless that is full or the pool
    /// is closed, in which case it is closed too. Every release wakes one
    /// waiter.
    pub fn release(&self, conn: Connection, healthy: bool) {
        let evicted = {
            let mut state = self.inner.lock();
            let reusable = healthy && !conn.is_broken() && !state.closed;
            if reusable && state.idle.len() < self.inner.config.max_idle {
                state.idle.push_front(IdleConnection {
                    conn,
                    since: Instant::now(),
                });
                None
            } else {
                state.active -= 1;
                Some(conn)
            }
        };

        if let Some(conn) = evicted {
            debug!(
                connection = conn.id(),
                healthy,
                broken = conn.is_broken(),
                "closing released connection"
            );
        }
        self.inner.available.notify_one();
    }

    /// Closes the pool: idle connections are closed, waiters fail with
    /// [`Error::PoolClosed`], and connections released later are closed
    /// instead of cached.
    pub fn close(&self) {
        let drained: Vec<IdleConnection> = {
            let mut state = self.inner.lock();
            state.closed = true;
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.active -= drained.len();
            drained
        };
        debug!(idle = drained.len(), "pool closed");
        drop(drained);
        self.inner.available.notify_waiters();
    }

    /// Returns `true` once [`close`](Pool::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Current occupancy.
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock();
        PoolStats {
            active: state.active,
            idle: state.idle.len(),
        }
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("active", &stats.active)
            .field("idle", &stats.idle)
            .finish()
    }
}

/// A checked-out connection that goes back to its pool when dropped.
///
/// The connection is released as healthy unless it has been marked broken,
/// so a command that failed with a transport error (or a reply abandoned by
/// cancelling the future) never puts the connection back into rotation.
pub struct PooledConnection {
    pool: Pool,
    conn: Option<Connection>,
}

impl PooledConnection {
    /// Closes the connection instead of returning it to the idle set.
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, false);
        }
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection is present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection is present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let healthy = !conn.is_broken();
            self.pool.release(conn, healthy);
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("connection", &self.conn.as_ref().map(Connection::id))
            .finish()
    }
}
