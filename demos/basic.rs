//! Basic usage examples for Pool

use esox_connectionpool::{BoxError, Configuration, Connection, Pool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Stand-in for a real transport connection
struct DemoConnection {
    id: usize,
}

impl Connection for DemoConnection {
    fn close(&mut self) -> Result<(), BoxError> {
        println!("   Closing connection {}", self.id);
        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== EsoxSolutions.ConnectionPool - Basic Examples ===\n");

    // Example 1: Borrow and return
    borrow_and_return();

    // Example 2: Replacing a bad connection
    replace_bad_connection();

    // Example 3: Retrying an unreachable address
    retry_until_success();

    // Example 4: Metrics and health
    metrics_and_health();
}

fn demo_pool(name: &str, size: usize) -> Pool<DemoConnection> {
    let counter = Arc::new(AtomicUsize::new(0));
    Pool::new(Configuration::new(name, size, "demo:1", move |_| {
        Ok(DemoConnection {
            id: counter.fetch_add(1, Ordering::SeqCst),
        })
    }))
}

fn borrow_and_return() {
    println!("1. Borrow and Return:");
    let pool = demo_pool("basic", 2);
    pool.init().wait().unwrap();

    let conn = pool.get(Duration::from_millis(100), false).unwrap();
    println!("   Borrowed connection {}", conn.id);
    println!("   Available while borrowed: {}", pool.available_count());
    pool.release(conn);
    println!("   Available after release: {}\n", pool.available_count());

    pool.close().wait().unwrap();
    println!();
}

fn replace_bad_connection() {
    println!("2. Bad Connection:");
    let pool = demo_pool("replace", 1);
    pool.init().wait().unwrap();

    let mut conn = pool.get(Duration::from_millis(100), false).unwrap();
    println!("   Marking connection {} bad", conn.id);
    conn.mark_bad();
    pool.release(conn);

    let fresh = pool.get(Duration::from_secs(1), false).unwrap();
    println!("   Got replacement connection {}", fresh.id);
    drop(fresh);

    pool.close().wait().unwrap();
    println!();
}

fn retry_until_success() {
    println!("3. Retry Until Success:");
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let pool = Pool::new(
        Configuration::new("retry", 1, "flaky:1", move |_| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt < 3 {
                println!("   Attempt {} failed", attempt);
                return Err("connection refused".into());
            }
            println!("   Attempt {} succeeded", attempt);
            Ok(DemoConnection { id: attempt })
        })
        .with_retry_duration(Duration::from_millis(50)),
    );

    pool.init().wait().unwrap();
    println!("   Pool populated after {} attempts\n", attempts.load(Ordering::SeqCst));
}

fn metrics_and_health() {
    println!("4. Metrics and Health:");
    let pool = demo_pool("metrics", 4);
    pool.init().wait().unwrap();

    {
        let _a = pool.get(Duration::from_millis(100), false).unwrap();
        let _b = pool.get(Duration::from_millis(100), false).unwrap();

        let health = pool.get_health_status();
        println!("   Health: {}", if health.is_healthy { "Healthy" } else { "Unhealthy" });
        println!("   Utilization: {:.1}%", health.utilization * 100.0);
        println!("   Borrowed: {}, Available: {}", health.borrowed_connections, health.available_connections);
    }

    let metrics = pool.export_metrics();
    println!("\n   Metrics:");
    for (key, value) in metrics {
        println!("     {}: {}", key, value);
    }

    match pool.export_metrics_prometheus(None) {
        Ok(text) => println!("\n{}", text),
        Err(e) => println!("   Error: {}", e),
    }
}
