//! Pool walkthrough against the mock factory.
//!
//! Demonstrates warm-up, checkout/return, lease expiry, invalidation
//! with a maintenance sweep, and graceful shutdown — no external service
//! required.
//!
//! # Running
//!
//! ```bash
//! cargo run --example pool_demo
//! ```

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use corral_pool::{Pool, PoolConfig};
use corral_testing::MockFactory;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = PoolConfig::new()
        .min_size(2)
        .max_size(5)
        .max_idle(3)
        .lease_timeout(Duration::from_millis(200))
        .wait_timeout(Duration::from_secs(1))
        .maintenance_interval(Duration::from_millis(100));

    let factory = MockFactory::new();
    let pool = Pool::new(config, factory.clone()).await?;

    println!("=== corral pool demo ===\n");
    print_status(&pool, "after warm-up");

    // 1. Basic checkout and return.
    println!("\n1. Checkout and return:");
    let conn = pool.acquire().await?;
    println!("  using connection {}", conn.underlying().unwrap().ping());
    pool.release(conn).await;
    print_status(&pool, "after return");

    // 2. Concurrent callers beyond max_size queue up FIFO.
    println!("\n2. Concurrent checkout (8 tasks, max_size 5):");
    let mut handles = vec![];
    for i in 0..8 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let conn = pool.acquire().await?;
            tokio::time::sleep(Duration::from_millis(20)).await;
            let id = conn.underlying().unwrap().id;
            pool.release(conn).await;
            Ok::<_, corral_pool::PoolError>((i, id))
        }));
    }
    for handle in handles {
        let (task, id) = handle.await??;
        println!("  task {task} used connection {id}");
    }
    print_status(&pool, "after burst");

    // 3. A connection held past its lease is reclaimed by the pool.
    println!("\n3. Lease expiry:");
    let straggler = pool.acquire().await?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    println!("  straggler state: {:?}", straggler.state());
    drop(straggler);

    // 4. Invalidation plus a maintenance sweep.
    println!("\n4. Invalidate and sweep:");
    let bad = pool.acquire().await?;
    bad.invalidate().await;
    pool.set_auto_maintain(true);
    tokio::time::sleep(Duration::from_millis(250)).await;
    pool.set_auto_maintain(false);
    print_status(&pool, "after sweep");
    println!(
        "  factory: {} created, {} released",
        factory.connects(),
        factory.disconnects()
    );

    // 5. Graceful shutdown.
    println!("\n5. Shutdown:");
    pool.close().await;
    println!(
        "  pool closed, {} connections still live",
        factory.live()
    );

    Ok(())
}

fn print_status(pool: &Pool<MockFactory>, label: &str) {
    let status = pool.status();
    println!(
        "  [{label}] {} idle / {} in use / {} total (max {})",
        status.available, status.in_use, status.total, status.max
    );
}
