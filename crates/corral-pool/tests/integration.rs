//! Pool integration tests.
//!
//! Everything runs against the in-process mock factory from
//! `corral-testing`, so no external service is required. Timing-driven
//! tests use tokio's paused clock for determinism.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use corral_pool::{ConnectionState, Pool, PoolConfig, PoolError, PoolRegistry};
use corral_testing::MockFactory;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config(min: usize, max: usize, idle: usize) -> PoolConfig {
    PoolConfig::new()
        .min_size(min)
        .max_size(max)
        .max_idle(idle)
        .lease_timeout(Duration::from_secs(60))
        .wait_timeout(Duration::from_secs(5))
}

// =============================================================================
// Warm-up and sizing
// =============================================================================

#[tokio::test]
async fn test_warm_up_creates_exactly_min_size() {
    init_tracing();
    let factory = MockFactory::new();
    let pool = Pool::new(config(3, 5, 4), factory.clone()).await.unwrap();

    assert_eq!(pool.total_count(), 3);
    assert_eq!(pool.idle_count(), 3);
    assert_eq!(pool.active_count(), 0);
    assert_eq!(factory.connects(), 3);
}

#[tokio::test]
async fn test_warm_up_failure_fails_construction() {
    let factory = MockFactory::new();
    factory.set_fail_connects(true);

    let result = Pool::new(config(2, 4, 4), factory.clone()).await;
    assert!(matches!(result, Err(PoolError::Factory(_))));
    assert_eq!(factory.live(), 0);
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let factory = MockFactory::new();
    // min_size above max_idle violates min <= idle <= max.
    let result = Pool::new(config(5, 8, 3), factory).await;
    assert!(matches!(result, Err(PoolError::Configuration(_))));
}

#[tokio::test]
async fn test_release_beyond_max_idle_disposes_excess() {
    init_tracing();
    let factory = MockFactory::new();
    let pool = Pool::new(config(1, 5, 2), factory.clone()).await.unwrap();

    let mut guards = Vec::new();
    for _ in 0..5 {
        guards.push(pool.acquire().await.unwrap());
    }
    assert_eq!(pool.total_count(), 5);
    assert_eq!(pool.active_count(), 5);
    assert_eq!(factory.connects(), 5);

    for guard in guards {
        pool.release(guard).await;
    }

    // Idle capacity is 2; the other three were disposed on recycle.
    assert_eq!(pool.idle_count(), 2);
    assert_eq!(pool.total_count(), 2);
    assert_eq!(factory.disconnects(), 3);
}

// =============================================================================
// Acquire / release protocol
// =============================================================================

#[tokio::test]
async fn test_acquire_reuses_released_connection() {
    let factory = MockFactory::new();
    let pool = Pool::new(config(1, 2, 2), factory.clone()).await.unwrap();

    let guard = pool.acquire().await.unwrap();
    assert_eq!(guard.state(), ConnectionState::Open);
    let first_id = guard.underlying().unwrap().id;
    pool.release(guard).await;

    let guard = pool.acquire().await.unwrap();
    assert_eq!(guard.underlying().unwrap().id, first_id);
    assert_eq!(guard.state(), ConnectionState::Open);
    assert_eq!(factory.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_acquire_times_out_when_exhausted() {
    init_tracing();
    let factory = MockFactory::new();
    let pool = Pool::new(
        config(1, 1, 1).wait_timeout(Duration::from_millis(100)),
        factory.clone(),
    )
    .await
    .unwrap();

    let held = pool.acquire().await.unwrap();

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, PoolError::WaitTimeout(_)));
    // A failed attempt leaves the population untouched.
    assert_eq!(pool.total_count(), 1);
    assert_eq!(factory.connects(), 1);

    drop(held);
}

#[tokio::test]
async fn test_waiter_is_served_after_release() {
    let factory = MockFactory::new();
    let pool = Pool::new(config(1, 1, 1), factory).await.unwrap();

    let guard = pool.acquire().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await.map(|g| g.underlying().unwrap().id) })
    };
    tokio::task::yield_now().await;

    pool.release(guard).await;
    let reused = waiter.await.unwrap().unwrap();
    assert_eq!(reused, 0);
}

#[tokio::test]
async fn test_dropping_guard_returns_connection() {
    let factory = MockFactory::new();
    let pool = Pool::new(config(1, 2, 2), factory).await.unwrap();

    let guard = pool.acquire().await.unwrap();
    assert!(format!("{guard:?}").contains("PoolGuard"));
    assert_eq!(pool.idle_count(), 0);
    drop(guard);

    // The drop path returns the connection on a spawned task.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(pool.idle_count(), 1);
    assert_eq!(pool.active_count(), 0);
}

#[tokio::test]
async fn test_dispose_failure_still_settles_accounting() {
    let factory = MockFactory::new();
    factory.set_fail_disconnects(true);
    // Idle capacity zero: every recycle disposes.
    let pool = Pool::new(config(0, 2, 0), factory.clone()).await.unwrap();

    let guard = pool.acquire().await.unwrap();
    assert_eq!(pool.total_count(), 1);
    pool.release(guard).await;

    assert_eq!(pool.total_count(), 0);
    assert_eq!(factory.disconnects(), 1);
}

// =============================================================================
// Lease timeout
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_lease_expiry_reclaims_connection() {
    init_tracing();
    let factory = MockFactory::new();
    let pool = Pool::new(
        config(1, 2, 2).lease_timeout(Duration::from_millis(50)),
        factory,
    )
    .await
    .unwrap();

    let guard = pool.acquire().await.unwrap();
    assert_eq!(pool.idle_count(), 0);

    // Held past the lease: reclaimed without caller action.
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(guard.state(), ConnectionState::TimedOut);
    assert_eq!(pool.idle_count(), 1);
    assert_eq!(pool.total_count(), 1);

    // The straggler's eventual close is a stale no-op.
    guard.close().await;
    assert_eq!(pool.idle_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_release_before_lease_expiry_keeps_state_closed() {
    let factory = MockFactory::new();
    let pool = Pool::new(
        config(1, 2, 2).lease_timeout(Duration::from_millis(50)),
        factory,
    )
    .await
    .unwrap();

    let guard = pool.acquire().await.unwrap();
    pool.release(guard).await;

    tokio::time::sleep(Duration::from_millis(80)).await;
    // One recycle only; the stale timer fired against a Closed connection.
    assert_eq!(pool.idle_count(), 1);
    assert_eq!(pool.total_count(), 1);
}

// =============================================================================
// Invalidation and maintenance
// =============================================================================

#[tokio::test]
async fn test_invalidated_connection_swept_by_maintenance() {
    init_tracing();
    let factory = MockFactory::new();
    let pool = Pool::new(config(1, 3, 2), factory.clone()).await.unwrap();

    let guard = pool.acquire().await.unwrap();
    guard.invalidate().await;

    // Lazy eviction: the faulted connection sits idle until the sweep.
    assert_eq!(pool.idle_count(), 1);
    assert_eq!(pool.total_count(), 1);

    pool.maintain().await;

    // Disposed by the sweep, then warm-up restored min_size.
    assert_eq!(factory.disconnects(), 1);
    assert_eq!(pool.idle_count(), 1);
    assert_eq!(pool.total_count(), 1);
    assert_eq!(factory.connects(), 2);
}

#[tokio::test]
async fn test_maintenance_keeps_valid_idle_connections() {
    let factory = MockFactory::new();
    let pool = Pool::new(config(2, 4, 3), factory.clone()).await.unwrap();

    pool.maintain().await;

    assert_eq!(pool.idle_count(), 2);
    assert_eq!(pool.total_count(), 2);
    assert_eq!(factory.disconnects(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_auto_maintain_runs_on_interval() {
    init_tracing();
    let factory = MockFactory::new();
    let pool = Pool::new(
        config(1, 3, 2).maintenance_interval(Duration::from_millis(25)),
        factory.clone(),
    )
    .await
    .unwrap();

    let guard = pool.acquire().await.unwrap();
    guard.invalidate().await;

    pool.set_auto_maintain(true);
    tokio::time::sleep(Duration::from_millis(80)).await;
    pool.set_auto_maintain(false);

    assert_eq!(factory.disconnects(), 1);
    assert_eq!(pool.idle_count(), 1);
    assert_eq!(pool.total_count(), 1);
}

#[tokio::test]
async fn test_sweep_survives_dispose_failures() {
    init_tracing();
    let factory = MockFactory::new();
    let pool = Pool::new(config(0, 4, 4), factory.clone()).await.unwrap();

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    a.invalidate().await;
    b.invalidate().await;
    assert_eq!(pool.idle_count(), 2);

    // Each eviction is independent; a failing disconnect must not stop
    // the sweep from removing the remaining invalid connections.
    factory.set_fail_disconnects(true);
    pool.maintain().await;

    assert_eq!(factory.disconnects(), 2);
    assert_eq!(pool.idle_count(), 0);
    assert_eq!(pool.total_count(), 0);
}

#[tokio::test]
async fn test_faulted_connection_is_not_reopened() {
    let factory = MockFactory::new();
    let pool = Pool::new(config(1, 2, 2), factory.clone()).await.unwrap();

    let guard = pool.acquire().await.unwrap();
    let faulted_id = guard.underlying().unwrap().id;
    guard.invalidate().await;

    // The faulted connection is culled at checkout, never healed.
    let guard = pool.acquire().await.unwrap();
    assert_eq!(guard.state(), ConnectionState::Open);
    assert_ne!(guard.underlying().unwrap().id, faulted_id);
    assert_eq!(factory.disconnects(), 1);
    assert_eq!(pool.total_count(), 1);
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_close_drains_idle_and_rejects_acquire() {
    init_tracing();
    let factory = MockFactory::new();
    let pool = Pool::new(config(2, 4, 4), factory.clone()).await.unwrap();

    let guard = pool.acquire().await.unwrap();
    pool.close().await;

    assert!(pool.is_closed());
    assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));

    // Checked-out connections are disposed when they come back.
    pool.release(guard).await;
    assert_eq!(pool.total_count(), 0);
    assert_eq!(factory.live(), 0);
}

#[tokio::test]
async fn test_close_disposes_never_checked_out_connections() {
    let factory = MockFactory::new();
    let pool = Pool::new(config(2, 4, 4), factory.clone()).await.unwrap();
    assert_eq!(factory.connects(), 2);

    // Warm-up connections were never acquired; close must still release
    // their underlying resources.
    pool.close().await;

    assert_eq!(factory.disconnects(), 2);
    assert_eq!(factory.live(), 0);
    assert_eq!(pool.total_count(), 0);
}

#[tokio::test]
async fn test_close_fails_blocked_waiters() {
    let factory = MockFactory::new();
    let pool = Pool::new(config(1, 1, 1), factory).await.unwrap();

    let held = pool.acquire().await.unwrap();
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };
    tokio::task::yield_now().await;

    pool.close().await;
    assert!(matches!(waiter.await.unwrap(), Err(PoolError::Closed)));

    drop(held);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquire_release_respects_max_size() {
    init_tracing();
    const TASKS: usize = 8;
    const ROUNDS: usize = 10;
    const MAX: usize = 3;

    let factory = MockFactory::new();
    let pool = Pool::new(config(0, MAX, MAX), factory.clone()).await.unwrap();

    let open_now = Arc::new(AtomicUsize::new(0));
    let open_peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..TASKS {
        let pool = pool.clone();
        let open_now = Arc::clone(&open_now);
        let open_peak = Arc::clone(&open_peak);
        handles.push(tokio::spawn(async move {
            for _ in 0..ROUNDS {
                let guard = pool.acquire().await.unwrap();
                let now = open_now.fetch_add(1, Ordering::SeqCst) + 1;
                open_peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
                open_now.fetch_sub(1, Ordering::SeqCst);
                pool.release(guard).await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(open_peak.load(Ordering::SeqCst) <= MAX);
    assert!(pool.total_count() <= MAX);
    assert!(pool.idle_count() <= MAX);
    assert_eq!(factory.live() as usize, pool.total_count());
}

// =============================================================================
// Configuration and registry
// =============================================================================

#[tokio::test]
async fn test_pool_from_properties() {
    let text = "\
        MIN_SIZE=2\n\
        MAX_SIZE=6\n\
        MAX_IDLE_SIZE=4\n\
        CONNECTION_TIME_OUT=60000\n\
        WAIT_TIME_OUT=1000\n\
        TIME_BETWEEN_POOL_MAINTENANCE=0\n";
    let config = PoolConfig::from_properties(text).unwrap();

    let factory = MockFactory::new();
    let pool = Pool::new(config, factory.clone()).await.unwrap();
    assert_eq!(pool.total_count(), 2);
    assert_eq!(pool.status().max, 6);
    assert_eq!(factory.connects(), 2);
}

#[tokio::test]
async fn test_registry_builds_each_pool_once() {
    init_tracing();
    let factory = MockFactory::new();
    let registry = {
        let factory = factory.clone();
        PoolRegistry::new(move |_name: &str| {
            let factory = factory.clone();
            Box::pin(async move { Pool::new(config(1, 4, 2), factory).await })
        })
    };

    assert!(registry.get("orders").await.is_none());

    let first = registry.get_or_build("orders").await.unwrap();
    let again = registry.get_or_build("orders").await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(factory.connects(), 1);

    let other = registry.get_or_build("billing").await.unwrap();
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(factory.connects(), 2);

    registry.close_all().await;
    assert!(first.is_closed());
    assert!(other.is_closed());
    assert_eq!(factory.live(), 0);
}
