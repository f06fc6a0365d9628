//! Connection lifecycle events and the pool's callback seam.
//!
//! A connection that leaves the `Open` state reports the transition to a
//! single event sink: the pool that owns it. All three events funnel into
//! the same recycle action, because the pool does not care *why* a
//! connection became available, only that it is no longer checked out.
//! This is a direct trait-method call, not a pub/sub mechanism; there is
//! exactly one consumer per pool.

use std::sync::Arc;

use async_trait::async_trait;

use crate::connection::PooledConnection;

/// A lifecycle transition reported by a connection to its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The caller returned the connection.
    Closed,
    /// The lease timer fired while the connection was still checked out.
    TimedOut,
    /// The caller signaled a fault.
    ErrorOccurred,
}

/// Receiver for connection lifecycle events.
///
/// Implemented by the pool; connections hold a `Weak` reference so a
/// dropped pool orphans its outstanding connections harmlessly.
#[async_trait]
pub trait EventSink<C: Send + 'static>: Send + Sync {
    /// Handle a lifecycle event from `conn`.
    async fn connection_event(&self, conn: Arc<PooledConnection<C>>, event: ConnectionEvent);
}
