//! Mock connection factory.
//!
//! Stands in for a real data source in tests: hands out numbered
//! connections, counts every connect and disconnect, and can be switched
//! to fail on demand to exercise factory-error and dispose-error paths.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use corral_pool::{ConnectionFactory, PoolError};

/// A fake underlying connection.
#[derive(Debug)]
pub struct MockConnection {
    /// Sequential id, unique per factory.
    pub id: u64,
}

impl MockConnection {
    /// Pretend to do some work on the connection.
    pub fn ping(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Default)]
struct MockState {
    next_id: AtomicU64,
    connects: AtomicU64,
    disconnects: AtomicU64,
    fail_connects: AtomicBool,
    fail_disconnects: AtomicBool,
    connect_delay_ms: AtomicU64,
}

/// Factory producing [`MockConnection`]s.
///
/// Clones share the same counters and failure switches, so tests keep a
/// handle after moving the factory into a pool.
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    state: Arc<MockState>,
}

impl MockFactory {
    /// Create a fresh factory with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total successful connects so far.
    pub fn connects(&self) -> u64 {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Total disconnects so far.
    pub fn disconnects(&self) -> u64 {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    /// Connections currently alive: connects minus disconnects.
    pub fn live(&self) -> u64 {
        self.connects().saturating_sub(self.disconnects())
    }

    /// Make every subsequent connect fail (or succeed again).
    pub fn set_fail_connects(&self, fail: bool) {
        self.state.fail_connects.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent disconnect fail (or succeed again).
    ///
    /// Disconnects are still counted when failing, since the pool
    /// abandons the underlying connection either way.
    pub fn set_fail_disconnects(&self, fail: bool) {
        self.state.fail_disconnects.store(fail, Ordering::SeqCst);
    }

    /// Delay every subsequent connect by `delay`. Zero disables.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.state
            .connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    type Connection = MockConnection;

    async fn connect(&self) -> Result<MockConnection, PoolError> {
        if self.state.fail_connects.load(Ordering::SeqCst) {
            return Err(PoolError::Factory("mock connect failure".into()));
        }
        let delay = self.state.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(id, "mock connection established");
        Ok(MockConnection { id })
    }

    async fn disconnect(&self, conn: MockConnection) -> Result<(), PoolError> {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(id = conn.id, "mock connection released");
        if self.state.fail_disconnects.load(Ordering::SeqCst) {
            return Err(PoolError::Dispose("mock disconnect failure".into()));
        }
        Ok(())
    }
}
