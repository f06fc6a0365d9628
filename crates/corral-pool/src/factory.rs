//! Connection factory trait.
//!
//! The pool never constructs connections itself; physical establishment
//! and teardown are delegated to an injected factory. The factory's
//! connection type is opaque to the pool: it is stored, handed to
//! callers, and eventually given back to the factory for release.

use async_trait::async_trait;

use crate::error::PoolError;

/// Produces and releases the underlying connections managed by a pool.
///
/// Implementations typically wrap a database driver or a network client.
/// `#[async_trait]` is used for object safety so sinks and registries can
/// hold factories behind trait objects where needed.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// The opaque connection handle this factory produces.
    type Connection: Send + 'static;

    /// Establish one new underlying connection.
    ///
    /// Failures surface as [`PoolError::Factory`] to whichever pool
    /// operation triggered creation.
    async fn connect(&self) -> Result<Self::Connection, PoolError>;

    /// Release an underlying connection for good.
    ///
    /// Called exactly once per connection, during disposal.
    async fn disconnect(&self, conn: Self::Connection) -> Result<(), PoolError>;
}
