//! Pool error types.

use std::time::Duration;

use thiserror::Error;

use crate::state::ConnectionState;

/// Errors that can occur during pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// No idle connection became available within the wait timeout.
    #[error("timed out waiting for a connection after {0:?}")]
    WaitTimeout(Duration),

    /// The connection factory failed to produce a connection.
    #[error("failed to create connection: {0}")]
    Factory(String),

    /// The connection factory failed to release an underlying connection.
    ///
    /// Reported but never fatal: the connection is still marked disposed
    /// and the pool's accounting still settles.
    #[error("failed to release connection: {0}")]
    Dispose(String),

    /// Pool is closed.
    #[error("pool is closed")]
    Closed,

    /// Pool configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),

    /// A connection state transition was refused.
    ///
    /// Raised when reopening a faulted connection or disposing a
    /// connection that is still checked out.
    #[error("invalid connection state transition from {from:?}")]
    InvalidTransition {
        /// The state the connection was in when the transition was refused.
        from: ConnectionState,
    },
}
