//! The pool engine: bounded idle queue, acquire/release protocol, and
//! the maintenance sweeper.
//!
//! All mutation of the idle queue and the live-connection count is
//! serialized by one pool-wide lock, held only for short non-`await`
//! critical sections. Waiting for an idle connection is the single
//! suspension point in [`Pool::acquire`] and goes through a semaphore
//! whose permit count mirrors the idle-queue length; tokio queues
//! semaphore waiters in arrival order, which gives FIFO fairness so no
//! caller starves under sustained contention.
//!
//! Invariant: available permits never exceed the idle-queue length. A
//! connection is pushed before its permit is added, and a permit is
//! consumed before its connection is popped, so a held permit always
//! corresponds to a poppable entry.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use async_trait::async_trait;

use crate::config::PoolConfig;
use crate::connection::PooledConnection;
use crate::error::PoolError;
use crate::events::{ConnectionEvent, EventSink};
use crate::factory::ConnectionFactory;

/// A bounded pool of externally-provisioned connections.
///
/// Cheap to clone; clones share the same pool state.
pub struct Pool<F: ConnectionFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ConnectionFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct PoolInner<F: ConnectionFactory> {
    config: PoolConfig,
    factory: F,
    shared: Mutex<Shared<F::Connection>>,
    /// Permit count mirrors the idle-queue length.
    idle_items: Semaphore,
    maintenance: Mutex<Option<JoinHandle<()>>>,
    /// Weak self-reference, installed once at construction; connections
    /// report lifecycle events through it.
    self_ref: tokio::sync::OnceCell<Weak<PoolInner<F>>>,
}

struct Shared<C: Send + 'static> {
    idle: VecDeque<Arc<PooledConnection<C>>>,
    /// Connections currently alive, idle or checked out.
    total: usize,
    closed: bool,
}

/// Point-in-time snapshot of pool population.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: usize,
    /// Number of connections currently checked out.
    pub in_use: usize,
    /// Total live connections.
    pub total: usize,
    /// Maximum allowed connections.
    pub max: usize,
}

impl<F: ConnectionFactory> Pool<F> {
    /// Build a pool and warm it up to `min_size` connections.
    ///
    /// Fails if the configuration is invalid or the factory cannot
    /// produce the initial population.
    pub async fn new(config: PoolConfig, factory: F) -> Result<Self, PoolError> {
        config.validate()?;
        let inner = Arc::new(PoolInner {
            config,
            factory,
            shared: Mutex::new(Shared {
                idle: VecDeque::new(),
                total: 0,
                closed: false,
            }),
            idle_items: Semaphore::new(0),
            maintenance: Mutex::new(None),
            self_ref: tokio::sync::OnceCell::new(),
        });
        let _ = inner.self_ref.set(Arc::downgrade(&inner));
        inner.warm_up().await?;
        Ok(Self { inner })
    }

    /// Check out a connection, waiting up to the configured wait timeout.
    ///
    /// Creates a new connection first when the idle queue is empty and
    /// the pool is below `max_size`. Fails with
    /// [`PoolError::WaitTimeout`] if no connection becomes available in
    /// time; a failed attempt leaves pool population untouched.
    pub async fn acquire(&self) -> Result<PoolGuard<F::Connection>, PoolError> {
        self.inner.acquire().await
    }

    /// Return a connection to the pool.
    ///
    /// The caller's only sanctioned way of saying "I'm done". Never
    /// releases the underlying resource directly; disposal is decided by
    /// the pool during recycling. Equivalent to dropping the guard, but
    /// deterministic.
    pub async fn release(&self, mut guard: PoolGuard<F::Connection>) {
        if let Some(conn) = guard.conn.take() {
            conn.close().await;
        }
    }

    /// Start or stop the periodic maintenance sweeper.
    ///
    /// Has no effect when enabling and `maintenance_interval` is zero.
    /// The first sweep runs one full interval after enabling.
    pub fn set_auto_maintain(&self, enabled: bool) {
        let mut task = self.inner.maintenance.lock();
        if enabled {
            if task.is_some() || self.inner.config.maintenance_interval.is_zero() {
                return;
            }
            let weak = Arc::downgrade(&self.inner);
            let period = self.inner.config.maintenance_interval;
            *task = Some(tokio::spawn(async move {
                let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
                loop {
                    ticks.tick().await;
                    let Some(inner) = weak.upgrade() else { break };
                    inner.maintain().await;
                }
            }));
        } else if let Some(handle) = task.take() {
            handle.abort();
        }
    }

    /// Run one maintenance sweep immediately.
    ///
    /// Evicts invalid idle connections, then restores `min_size`. The
    /// same pass the background sweeper runs on its interval.
    pub async fn maintain(&self) {
        self.inner.maintain().await;
    }

    /// Close the pool: stop maintenance, dispose all idle connections,
    /// and fail blocked and future acquires with [`PoolError::Closed`].
    ///
    /// Checked-out connections are disposed as they are returned.
    pub async fn close(&self) {
        self.set_auto_maintain(false);
        self.inner.shared.lock().closed = true;
        self.inner.idle_items.close();
        loop {
            let conn = self.inner.shared.lock().idle.pop_front();
            let Some(conn) = conn else { break };
            self.inner.dispose_connection(&conn).await;
        }
        tracing::info!("connection pool closed");
    }

    /// Whether [`Pool::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.inner.shared.lock().closed
    }

    /// Number of idle connections.
    pub fn idle_count(&self) -> usize {
        self.inner.shared.lock().idle.len()
    }

    /// Number of checked-out connections.
    pub fn active_count(&self) -> usize {
        let shared = self.inner.shared.lock();
        shared.total.saturating_sub(shared.idle.len())
    }

    /// Total live connections, idle or checked out.
    pub fn total_count(&self) -> usize {
        self.inner.shared.lock().total
    }

    /// Snapshot of the pool population.
    pub fn status(&self) -> PoolStatus {
        let shared = self.inner.shared.lock();
        PoolStatus {
            available: shared.idle.len(),
            in_use: shared.total.saturating_sub(shared.idle.len()),
            total: shared.total,
            max: self.inner.config.max_size,
        }
    }

    /// The pool's configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

impl<F: ConnectionFactory> PoolInner<F> {
    async fn acquire(&self) -> Result<PoolGuard<F::Connection>, PoolError> {
        let deadline = Instant::now() + self.config.wait_timeout;
        loop {
            // Grow by one when nothing is idle and we are under max_size.
            // At max_size the caller just waits; hitting the ceiling is
            // reported, not fatal.
            let grow = {
                let mut shared = self.shared.lock();
                if shared.closed {
                    return Err(PoolError::Closed);
                }
                if shared.idle.is_empty() {
                    if shared.total < self.config.max_size {
                        shared.total += 1;
                        true
                    } else {
                        tracing::warn!("connection limit reached");
                        false
                    }
                } else {
                    false
                }
            };
            if grow {
                self.grow_one().await?;
            }

            let remaining = deadline.duration_since(Instant::now());
            let permit = match tokio::time::timeout(remaining, self.idle_items.acquire()).await {
                Err(_) => {
                    tracing::error!("connection wait timed out");
                    return Err(PoolError::WaitTimeout(self.config.wait_timeout));
                }
                Ok(Err(_)) => return Err(PoolError::Closed),
                Ok(Ok(permit)) => permit,
            };
            // The permit now stands for the entry we are about to pop.
            permit.forget();
            let conn = self.shared.lock().idle.pop_front();
            let Some(conn) = conn else { continue };

            if !conn.is_valid() {
                // Faulted while idle; cull it and try again within the
                // remaining deadline.
                tracing::debug!("invalid idle connection, disposing");
                self.dispose_connection(&conn).await;
                continue;
            }
            if conn.open(self.config.lease_timeout).is_err() {
                self.dispose_connection(&conn).await;
                continue;
            }
            tracing::trace!("connection taken");
            return Ok(PoolGuard { conn: Some(conn) });
        }
    }

    /// Create one connection and enqueue it. The caller must already
    /// have reserved a slot in `total`; the slot is released on failure.
    async fn grow_one(&self) -> Result<(), PoolError> {
        match self.create_connection().await {
            Ok(conn) => {
                let total = {
                    let mut shared = self.shared.lock();
                    shared.idle.push_back(conn);
                    shared.total
                };
                self.idle_items.add_permits(1);
                tracing::trace!(total, "new connection established");
                Ok(())
            }
            Err(e) => {
                let mut shared = self.shared.lock();
                shared.total = shared.total.saturating_sub(1);
                Err(e)
            }
        }
    }

    async fn create_connection(&self) -> Result<Arc<PooledConnection<F::Connection>>, PoolError> {
        let raw = self.factory.connect().await?;
        // Installed in Pool::new before any connection is created.
        let Some(weak) = self.self_ref.get() else {
            return Err(PoolError::Factory("pool event sink not initialized".into()));
        };
        let sink: Weak<dyn EventSink<F::Connection>> = weak.clone();
        Ok(PooledConnection::new(raw, sink))
    }

    /// Grow the pool back to `min_size`. Run at construction and after
    /// every maintenance sweep.
    async fn warm_up(&self) -> Result<(), PoolError> {
        loop {
            {
                let mut shared = self.shared.lock();
                if shared.closed || shared.total >= self.config.min_size {
                    return Ok(());
                }
                shared.total += 1;
            }
            self.grow_one().await?;
        }
    }

    /// Recycle a connection that is no longer checked out: bounded
    /// enqueue, or dispose when idle capacity is exceeded or the pool is
    /// closed.
    ///
    /// A faulted connection is still enqueued (lazy eviction); the next
    /// sweep or acquire-side validation culls it.
    async fn recycle(&self, conn: Arc<PooledConnection<F::Connection>>) {
        let accepted = {
            let mut shared = self.shared.lock();
            if !shared.closed
                && shared.idle.len() < self.config.max_idle
                && !conn.state().is_terminal()
            {
                shared.idle.push_back(Arc::clone(&conn));
                true
            } else {
                false
            }
        };
        if accepted {
            self.idle_items.add_permits(1);
            tracing::trace!("connection recycled");
        } else {
            self.dispose_connection(&conn).await;
        }
    }

    /// Dispose a connection that is out of the idle queue and settle the
    /// accounting for it.
    async fn dispose_connection(&self, conn: &Arc<PooledConnection<F::Connection>>) {
        let total = {
            let mut shared = self.shared.lock();
            shared.total = shared.total.saturating_sub(1);
            shared.total
        };
        if let Err(e) = conn.dispose(&self.factory).await {
            tracing::warn!(error = %e, "connection release failed");
        }
        tracing::trace!(total, "connection disposed");
    }

    /// Remove a specific connection from the idle queue, if still there,
    /// and dispose it.
    ///
    /// A permit is consumed before touching the queue so waiters never
    /// see more permits than entries; if the connection was snatched by
    /// a concurrent acquire in the meantime, the permit is handed back
    /// untouched.
    async fn remove_and_dispose(&self, conn: &Arc<PooledConnection<F::Connection>>) {
        let Ok(permit) = self.idle_items.try_acquire() else {
            return;
        };
        permit.forget();
        let removed = {
            let mut shared = self.shared.lock();
            match shared.idle.iter().position(|c| Arc::ptr_eq(c, conn)) {
                Some(index) => {
                    shared.idle.remove(index);
                    true
                }
                None => false,
            }
        };
        if removed {
            self.dispose_connection(conn).await;
        } else {
            self.idle_items.add_permits(1);
        }
    }

    /// One maintenance sweep: evict invalid idle connections, then
    /// restore the minimum population. Checked-out connections are never
    /// touched. Each eviction is independent; one failure never aborts
    /// the sweep.
    async fn maintain(&self) {
        tracing::trace!("starting pool maintenance");
        let snapshot: Vec<_> = self.shared.lock().idle.iter().cloned().collect();
        for conn in snapshot {
            if !conn.is_valid() {
                tracing::info!("invalid connection found");
                self.remove_and_dispose(&conn).await;
            }
        }
        if let Err(e) = self.warm_up().await {
            tracing::warn!(error = %e, "warm-up failed during maintenance");
        }
        tracing::trace!("ending pool maintenance");
    }
}

#[async_trait]
impl<F: ConnectionFactory> EventSink<F::Connection> for PoolInner<F> {
    async fn connection_event(
        &self,
        conn: Arc<PooledConnection<F::Connection>>,
        event: ConnectionEvent,
    ) {
        match event {
            ConnectionEvent::Closed => tracing::trace!("connection closed"),
            ConnectionEvent::TimedOut => tracing::warn!("connection timed out"),
            ConnectionEvent::ErrorOccurred => tracing::warn!("connection error occurred"),
        }
        self.recycle(conn).await;
    }
}

impl<F: ConnectionFactory> Drop for PoolInner<F> {
    fn drop(&mut self) {
        if let Some(handle) = self.maintenance.lock().take() {
            handle.abort();
        }
    }
}

/// A connection checked out from the pool.
///
/// Dereferences to the managed connection; reach the raw connection via
/// [`PooledConnection::underlying`]. Dropping the guard returns the
/// connection to the pool; [`Pool::release`] or [`PoolGuard::close`] do
/// the same deterministically.
pub struct PoolGuard<C: Send + 'static> {
    conn: Option<Arc<PooledConnection<C>>>,
}

impl<C: Send + 'static> PoolGuard<C> {
    /// Return the connection to the pool.
    pub async fn close(mut self) {
        if let Some(conn) = self.conn.take() {
            conn.close().await;
        }
    }

    /// Signal that the connection is faulted and give it back.
    ///
    /// The pool will not hand a faulted connection out again; it is
    /// culled lazily by maintenance or on the next checkout attempt.
    pub async fn invalidate(mut self) {
        if let Some(conn) = self.conn.take() {
            conn.invalidate().await;
        }
    }
}

impl<C: Send + 'static> std::fmt::Debug for PoolGuard<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolGuard")
            .field("conn", &self.conn)
            .finish()
    }
}

impl<C: Send + 'static> std::ops::Deref for PoolGuard<C> {
    type Target = PooledConnection<C>;

    // Present from acquire until close/invalidate/drop consume the guard.
    #[allow(clippy::expect_used)]
    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection already returned")
    }
}

impl<C: Send + 'static> Drop for PoolGuard<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            // Close asynchronously; outside a runtime there is no pool
            // left to return to, so the connection is simply dropped.
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    conn.close().await;
                });
            }
        }
    }
}
