//! Behavioural tests for the connection pool lifecycle

use esox_connectionpool::{BoxError, Configuration, Connection, Pool, PoolError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Mock connection that reports when it is closed
struct MockConn {
    serial: usize,
    closes: Arc<AtomicUsize>,
}

impl Connection for MockConn {
    fn close(&mut self) -> Result<(), BoxError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Counts factory invocations and closes
#[derive(Clone, Default)]
struct Counters {
    created: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl Counters {
    fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

fn mock_pool(size: usize) -> (Pool<MockConn>, Counters) {
    let counters = Counters::default();
    let factory_counters = counters.clone();
    let pool = Pool::new(Configuration::new("mock", size, "mock:0", move |_| {
        let serial = factory_counters.created.fetch_add(1, Ordering::SeqCst);
        Ok(MockConn {
            serial,
            closes: Arc::clone(&factory_counters.closed),
        })
    }));
    (pool, counters)
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn test_init_creates_connections() {
    init_logging();
    let (pool, counters) = mock_pool(5);

    pool.init().wait().unwrap();

    assert_eq!(counters.created(), pool.config().size);
    assert_eq!(pool.available_count(), 5);
}

#[test]
fn test_close_closes_all_connections() {
    init_logging();
    let (pool, counters) = mock_pool(5);
    pool.init().wait().unwrap();

    pool.close().wait().unwrap();

    // Shutting down must not open anything new
    assert_eq!(counters.created(), 5);
    assert_eq!(counters.closed(), 5);
    assert!(pool.is_closed());
    assert_eq!(pool.available_count(), 0);
}

#[test]
fn test_get_returns_connections_and_errs_on_timeout() {
    init_logging();
    let (pool, _) = mock_pool(3);
    pool.init().wait().unwrap();

    let mut held = Vec::new();
    for _ in 0..pool.config().size {
        held.push(pool.get(Duration::from_secs(1), false).unwrap());
    }

    let start = Instant::now();
    let result = pool.get(Duration::from_millis(1), false);
    let elapsed = start.elapsed();

    assert!(matches!(result, Err(PoolError::Timeout(d)) if d == Duration::from_millis(1)));
    assert!(elapsed >= Duration::from_millis(1));
}

#[test]
fn test_timeout_waits_for_full_window() {
    let (pool, _) = mock_pool(1);
    pool.init().wait().unwrap();
    let _held = pool.get(Duration::from_millis(10), false).unwrap();

    let start = Instant::now();
    let err = pool.get(Duration::from_millis(50), false).unwrap_err();
    assert!(err.is_timeout());
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert_eq!(pool.get_metrics().timeouts, 1);
}

#[test]
fn test_release_returns_the_connection_to_the_pool() {
    init_logging();
    let (pool, counters) = mock_pool(1);
    pool.init().wait().unwrap();

    let first = pool.get(Duration::from_millis(1), false).unwrap();
    let (first_id, first_serial) = (first.id(), first.serial);

    assert!(pool.get(Duration::from_millis(1), false).unwrap_err().is_timeout());

    pool.release(first);
    let second = pool.get(Duration::from_millis(1), false).unwrap();
    assert_eq!(second.id(), first_id);
    assert_eq!(second.serial, first_serial);
    assert_eq!(counters.created(), 1);
    assert_eq!(counters.closed(), 0);
}

#[test]
fn test_bad_connection_not_returned_to_the_pool() {
    init_logging();
    let (pool, counters) = mock_pool(1);
    pool.init().wait().unwrap();

    let mut first = pool.get(Duration::from_millis(1), false).unwrap();
    let (first_id, first_serial) = (first.id(), first.serial);
    first.mark_bad();
    assert!(first.is_bad());
    pool.release(first);

    // Close happens inline, replacement in the background
    assert_eq!(counters.closed(), 1);

    let second = pool.get(Duration::from_secs(5), false).unwrap();
    assert_ne!(second.id(), first_id);
    assert_ne!(second.serial, first_serial);
    assert!(!second.is_bad());
    assert_eq!(counters.created(), 2);
    assert_eq!(pool.get_metrics().replacements, 1);
}

#[test]
fn test_unmarking_bad_keeps_connection() {
    let (pool, counters) = mock_pool(1);
    pool.init().wait().unwrap();

    let mut conn = pool.get(Duration::from_millis(1), false).unwrap();
    let id = conn.id();
    conn.mark_bad();
    conn.set_bad(false);
    pool.release(conn);

    assert_eq!(pool.get(Duration::from_millis(10), false).unwrap().id(), id);
    assert_eq!(counters.created(), 1);
}

#[test]
fn test_pool_keeps_trying_to_open_connection_until_success() {
    init_logging();
    let calls = Arc::new(AtomicUsize::new(0));
    let attempts: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let retry = Duration::from_millis(10);

    let (c, a) = (Arc::clone(&calls), Arc::clone(&attempts));
    let pool = Pool::new(
        Configuration::new("flaky", 1, "mock:0", move |_| {
            a.lock().unwrap().push(Instant::now());
            // Fail four times, then succeed
            if c.fetch_add(1, Ordering::SeqCst) < 4 {
                return Err("bad conn".into());
            }
            Ok(MockConn {
                serial: 0,
                closes: Arc::new(AtomicUsize::new(0)),
            })
        })
        .with_retry_duration(retry),
    );

    pool.init().wait().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 5);
    let attempts = attempts.lock().unwrap();
    for pair in attempts.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= retry);
    }
    assert_eq!(pool.get_metrics().connect_failures, 4);
}

#[test]
fn test_failing_slot_does_not_block_others() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let pool = Pool::new(
        Configuration::new("partial", 3, "mock:0", move |_| {
            // Exactly one attempt fails; its slot retries later
            if c.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err("first attempt fails".into());
            }
            Ok(MockConn {
                serial: 0,
                closes: Arc::new(AtomicUsize::new(0)),
            })
        })
        .with_retry_duration(Duration::from_millis(200)),
    );

    let populated = pool.init();
    let start = Instant::now();
    while pool.available_count() < 2 && start.elapsed() < Duration::from_secs(5) {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(pool.available_count() >= 2);

    populated.wait_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(pool.available_count(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test]
fn test_concurrent_callers_never_share_a_connection() {
    init_logging();
    let (pool, counters) = mock_pool(4);
    pool.init().wait().unwrap();

    let in_use: Arc<Mutex<HashSet<u64>>> = Arc::new(Mutex::new(HashSet::new()));
    let mut workers = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        let in_use = Arc::clone(&in_use);
        workers.push(thread::spawn(move || {
            for _ in 0..50 {
                let conn = pool.get(Duration::from_secs(5), false).unwrap();
                assert!(in_use.lock().unwrap().insert(conn.id()));
                thread::yield_now();
                assert!(in_use.lock().unwrap().remove(&conn.id()));
                pool.release(conn);
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(pool.available_count(), 4);
    assert_eq!(pool.borrowed_count(), 0);
    assert_eq!(counters.created(), 4);
}

#[test]
fn test_capacity_holds_across_replacements() {
    let (pool, counters) = mock_pool(3);
    pool.init().wait().unwrap();

    for _ in 0..3 {
        let mut conn = pool.get(Duration::from_secs(1), false).unwrap();
        conn.mark_bad();
    }

    // Every bad connection is closed once and replaced once
    let start = Instant::now();
    while pool.available_count() < 3 && start.elapsed() < Duration::from_secs(5) {
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(pool.available_count(), 3);
    assert_eq!(counters.closed(), 3);
    assert_eq!(counters.created(), 6);
}

#[tokio::test]
async fn test_async_lifecycle() {
    let (pool, counters) = mock_pool(2);
    pool.init().wait_async().await.unwrap();

    let conn = pool.get_async(Duration::from_millis(100), false).await.unwrap();
    pool.release(conn);

    pool.close().wait_async().await.unwrap();
    assert_eq!(counters.closed(), 2);
}
