//! Name-keyed pool registry.
//!
//! Maps a logical name (a data-source name, typically) to a lazily built
//! pool. Deliberately not a process-wide singleton: the registry is an
//! explicitly constructed, explicitly owned value the application passes
//! around, and pools are shared out behind `Arc`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::PoolError;
use crate::factory::ConnectionFactory;
use crate::pool::Pool;

/// Future returned by a registry's pool builder.
pub type PoolFuture<F> = Pin<Box<dyn Future<Output = Result<Pool<F>, PoolError>> + Send>>;

/// Lazily builds and caches one pool per logical name.
pub struct PoolRegistry<F: ConnectionFactory> {
    builder: Box<dyn Fn(&str) -> PoolFuture<F> + Send + Sync>,
    pools: tokio::sync::Mutex<HashMap<String, Arc<Pool<F>>>>,
}

impl<F: ConnectionFactory> PoolRegistry<F> {
    /// Create a registry with the builder invoked on first lookup of
    /// each name.
    pub fn new(builder: impl Fn(&str) -> PoolFuture<F> + Send + Sync + 'static) -> Self {
        Self {
            builder: Box::new(builder),
            pools: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Get the pool for `name`, building it on first use.
    pub async fn get_or_build(&self, name: &str) -> Result<Arc<Pool<F>>, PoolError> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(name) {
            return Ok(Arc::clone(pool));
        }
        let pool = Arc::new((self.builder)(name).await?);
        pools.insert(name.to_owned(), Arc::clone(&pool));
        tracing::info!(name, "new connection pool created");
        Ok(pool)
    }

    /// Get the pool for `name` if it has already been built.
    pub async fn get(&self, name: &str) -> Option<Arc<Pool<F>>> {
        self.pools.lock().await.get(name).map(Arc::clone)
    }

    /// Close and forget every registered pool.
    pub async fn close_all(&self) {
        let pools: Vec<_> = self.pools.lock().await.drain().collect();
        for (name, pool) in pools {
            tracing::debug!(name, "closing registered pool");
            pool.close().await;
        }
    }
}

impl<F: ConnectionFactory> std::fmt::Debug for PoolRegistry<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry").finish_non_exhaustive()
    }
}
