//! Connection lifecycle states.
//!
//! Every pooled connection is in exactly one of these states at any
//! instant. Transitions are driven by caller actions (`close`,
//! `invalidate`), lease-timer expiry (`timeout`), or the pool itself
//! (`dispose`).
//!
//! ## State Transitions
//!
//! Fresh connections start `Closed`, the same state a returned
//! connection sits in while idle.
//!
//! ```text
//! Open -> Closed         (caller returns the connection)
//! Open -> TimedOut       (lease timer fires while still checked out)
//! Open -> ErrorOccurred  (caller signals a fault)
//! Closed | TimedOut -> Open       (checked out)
//! Closed | TimedOut | ErrorOccurred -> Disposed  (terminal)
//! ```
//!
//! `Disposed` is terminal and unreachable directly from `Open`; a
//! checked-out connection must leave `Open` before the pool may release
//! its underlying resource.

/// Lifecycle state of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Checked out and usable by a caller.
    Open,
    /// Returned by the caller, eligible for recycling.
    Closed,
    /// Lease expired while still checked out.
    TimedOut,
    /// Caller signaled a fault; the connection is no longer trusted.
    ErrorOccurred,
    /// Underlying connection released; the wrapper is inert.
    Disposed,
}

impl ConnectionState {
    /// Whether maintenance should keep the connection in rotation.
    ///
    /// Only `ErrorOccurred` fails validation: a `Closed` or `TimedOut`
    /// idle connection is trusted until its owner signals an error.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::ErrorOccurred)
    }

    /// Whether the connection may be checked out.
    ///
    /// Faulted connections are deliberately excluded: reopening would
    /// silently mask the fault, so the pool disposes them instead. An
    /// `Open` connection is already checked out and cannot be opened
    /// twice.
    #[must_use]
    pub fn can_reopen(&self) -> bool {
        matches!(self, Self::Closed | Self::TimedOut)
    }

    /// Whether the connection has reached its terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disposed)
    }
}
