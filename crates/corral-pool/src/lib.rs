//! # corral-pool
//!
//! Bounded async pool for expensive, externally-provisioned connections.
//!
//! The pool amortizes connection-establishment cost while bounding the
//! number of live connections and protecting callers from unbounded
//! wait. Physical connection creation is delegated to an injected
//! [`ConnectionFactory`]; the pool only manages lifecycle.
//!
//! ## Features
//!
//! - Bounded idle queue with FIFO waiter fairness
//! - Configurable min/max pool sizes and idle capacity
//! - Lease timeouts that reclaim connections held too long
//! - Acquire wait timeouts so callers never block indefinitely
//! - Periodic maintenance that evicts faulted idle connections and
//!   restores the minimum population
//! - Name-keyed registry for lazily built pools
//!
//! ## Example
//!
//! ```rust,ignore
//! use corral_pool::{Pool, PoolConfig};
//!
//! let config = PoolConfig::new()
//!     .min_size(2)
//!     .max_size(10)
//!     .wait_timeout(Duration::from_secs(5));
//!
//! let pool = Pool::new(config, factory).await?;
//! let conn = pool.acquire().await?;
//! // Use connection...
//! pool.release(conn).await;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod factory;
pub mod pool;
pub mod registry;
pub mod state;

pub use config::PoolConfig;
pub use connection::PooledConnection;
pub use error::PoolError;
pub use events::{ConnectionEvent, EventSink};
pub use factory::ConnectionFactory;
pub use pool::{Pool, PoolGuard, PoolStatus};
pub use registry::{PoolFuture, PoolRegistry};
pub use state::ConnectionState;
