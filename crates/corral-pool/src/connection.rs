//! The managed connection wrapper and its lifecycle state machine.
//!
//! A [`PooledConnection`] wraps exactly one underlying connection for the
//! connection's entire life: the pool owns it, callers only borrow it.
//! The wrapper tracks lifecycle state, runs the lease timer that reclaims
//! connections held too long, and reports transitions to the pool through
//! the event sink.
//!
//! All state flips happen under a per-connection lock, so a caller's
//! `close` and a firing lease timer can never race into a corrupt state:
//! whichever performs a valid transition first wins, the other is a
//! silent no-op.

use std::sync::{Arc, Weak};

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::error::PoolError;
use crate::events::{ConnectionEvent, EventSink};
use crate::factory::ConnectionFactory;
use crate::state::ConnectionState;

/// A pooled wrapper around one opaque underlying connection.
///
/// Never exposes the underlying connection as usable outside the
/// [`ConnectionState::Open`] state by contract; callers reach it through
/// the guard returned by `Pool::acquire`.
pub struct PooledConnection<C: Send + 'static> {
    state: Mutex<ConnectionState>,
    underlying: Mutex<Option<C>>,
    lease_timer: Mutex<Option<JoinHandle<()>>>,
    sink: Weak<dyn EventSink<C>>,
}

impl<C: Send + 'static> PooledConnection<C> {
    /// Wrap a freshly created underlying connection.
    ///
    /// New connections start `Closed`, the same state returned
    /// connections idle in, so the pool can dispose a connection that
    /// was never checked out. `open` moves it to `Open` on checkout.
    pub(crate) fn new(underlying: C, sink: Weak<dyn EventSink<C>>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ConnectionState::Closed),
            underlying: Mutex::new(Some(underlying)),
            lease_timer: Mutex::new(None),
            sink,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Whether maintenance should keep this connection in rotation.
    pub fn is_valid(&self) -> bool {
        self.state().is_valid()
    }

    /// Lock the underlying connection for use.
    ///
    /// Returns `None` once the connection has been disposed.
    pub fn underlying(&self) -> Option<MappedMutexGuard<'_, C>> {
        MutexGuard::try_map(self.underlying.lock(), Option::as_mut).ok()
    }

    /// Mark the connection checked out and start its lease timer.
    ///
    /// Valid from `Closed` and `TimedOut`. Reopening a faulted
    /// (`ErrorOccurred`) connection is refused so a fault is never
    /// silently healed by reuse; the pool disposes such connections
    /// instead. Any prior pending timer is replaced.
    pub(crate) fn open(self: &Arc<Self>, lease: Duration) -> Result<(), PoolError> {
        {
            let mut state = self.state.lock();
            if !state.can_reopen() {
                return Err(PoolError::InvalidTransition { from: *state });
            }
            *state = ConnectionState::Open;
        }
        self.restart_lease_timer(lease);
        Ok(())
    }

    /// Return the connection: mark it `Closed` and notify the pool.
    ///
    /// Does not release the underlying resource; disposal is decided by
    /// the pool during recycling. No-op if not currently `Open`.
    pub async fn close(self: &Arc<Self>) {
        let emitted = {
            let mut state = self.state.lock();
            if *state == ConnectionState::Open {
                *state = ConnectionState::Closed;
                true
            } else {
                false
            }
        };
        if emitted {
            self.emit(ConnectionEvent::Closed).await;
        }
    }

    /// Signal a fault: mark the connection `ErrorOccurred` and notify the
    /// pool.
    ///
    /// Idempotent; no-op if already faulted or disposed.
    pub async fn invalidate(self: &Arc<Self>) {
        let emitted = {
            let mut state = self.state.lock();
            match *state {
                ConnectionState::ErrorOccurred | ConnectionState::Disposed => false,
                _ => {
                    *state = ConnectionState::ErrorOccurred;
                    true
                }
            }
        };
        if emitted {
            tracing::warn!("connection invalidated");
            self.emit(ConnectionEvent::ErrorOccurred).await;
        }
    }

    /// Lease expiry: mark the connection `TimedOut` and notify the pool.
    ///
    /// Only fires while still `Open`; a timer racing a caller's `close`
    /// is a silent no-op. Stale timers are expected and harmless.
    pub(crate) async fn timeout(self: &Arc<Self>) {
        let emitted = {
            let mut state = self.state.lock();
            if *state == ConnectionState::Open {
                *state = ConnectionState::TimedOut;
                true
            } else {
                false
            }
        };
        if emitted {
            self.emit(ConnectionEvent::TimedOut).await;
        }
    }

    /// Release the underlying connection and mark the wrapper `Disposed`.
    ///
    /// Refused while `Open`: a caller still believes it owns the
    /// connection, so disposal must go through `close`, `timeout` or
    /// `invalidate` first. Idempotent once disposed. A factory release
    /// failure surfaces as [`PoolError::Dispose`], but the wrapper is
    /// still `Disposed` and inert so no accounting entry leaks.
    pub(crate) async fn dispose<F>(&self, factory: &F) -> Result<(), PoolError>
    where
        F: ConnectionFactory<Connection = C>,
    {
        {
            let mut state = self.state.lock();
            match *state {
                ConnectionState::Open => {
                    return Err(PoolError::InvalidTransition {
                        from: ConnectionState::Open,
                    });
                }
                ConnectionState::Disposed => return Ok(()),
                _ => *state = ConnectionState::Disposed,
            }
        }
        self.cancel_lease_timer();
        let raw = self.underlying.lock().take();
        if let Some(raw) = raw {
            factory
                .disconnect(raw)
                .await
                .map_err(|e| PoolError::Dispose(e.to_string()))?;
        }
        Ok(())
    }

    /// Replace any pending lease timer with a fresh one.
    fn restart_lease_timer(self: &Arc<Self>, lease: Duration) {
        let conn = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(lease).await;
            if let Some(conn) = conn.upgrade() {
                conn.timeout().await;
            }
        });
        if let Some(previous) = self.lease_timer.lock().replace(handle) {
            previous.abort();
        }
    }

    fn cancel_lease_timer(&self) {
        if let Some(handle) = self.lease_timer.lock().take() {
            handle.abort();
        }
    }

    async fn emit(self: &Arc<Self>, event: ConnectionEvent) {
        if let Some(sink) = self.sink.upgrade() {
            sink.connection_event(Arc::clone(self), event).await;
        }
    }
}

impl<C: Send + 'static> std::fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<C: Send + 'static> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        // Dropping outside dispose() still cancels the timer task.
        self.cancel_lease_timer();
    }
}
