//! Async usage examples

use esox_connectionpool::{Configuration, Pool};
use std::net::TcpStream;
use std::time::Duration;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== EsoxSolutions.ConnectionPool - Async Examples ===\n");

    // A local listener stands in for the remote service
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let mut accepted = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            accepted.push(socket);
        }
    });

    let pool: Pool<TcpStream> = Pool::new(
        Configuration::tcp("upstream", 3, address).with_retry_duration(Duration::from_millis(100)),
    );

    // Example 1: Wait for population
    println!("1. Populate:");
    pool.init().wait_async().await.unwrap();
    println!("   Available: {}\n", pool.available_count());

    // Example 2: Concurrent access
    println!("2. Concurrent Access:");
    let mut handles = vec![];
    for i in 0..6 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            match pool.get_async(Duration::from_millis(200), false).await {
                Ok(conn) => {
                    println!("   Task {} got {}", i, conn.local_addr().unwrap());
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Err(e) => println!("   Task {} error: {}", i, e),
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    println!();

    // Example 3: On-demand connection beyond capacity
    println!("3. On Demand:");
    let held: Vec<_> = (0..3)
        .map(|_| pool.try_get().unwrap())
        .collect();
    let extra = pool.get_async(Duration::from_millis(10), true).await.unwrap();
    println!("   Extra connection is overflow: {}", extra.is_overflow());
    drop(extra);
    drop(held);
    println!();

    // Example 4: Shutdown
    println!("4. Close:");
    pool.close().wait_async().await.unwrap();
    println!("   Closed: {}", pool.is_closed());
}
