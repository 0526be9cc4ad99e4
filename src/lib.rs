//! # EsoxSolutions.ConnectionPool
//!
//! Fixed-capacity, thread-safe pool of network connections.
//!
//! ## Features
//!
//! - Fixed number of long-lived connections, populated in the background
//! - Connection attempts retried forever at a fixed interval
//! - Borrow with timeout, optionally creating an extra connection on demand
//! - Bad connections closed and replaced without blocking the caller
//! - Automatic return of connections via RAII (Drop trait)
//! - Async support for waiting on connections and lifecycle signals
//! - Health monitoring and metrics, with Prometheus export
//! - Structured logging through `tracing`
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_connectionpool::{BoxError, Configuration, Connection, Pool};
//! use std::time::Duration;
//!
//! struct Echo;
//!
//! impl Connection for Echo {
//!     fn close(&mut self) -> Result<(), BoxError> {
//!         Ok(())
//!     }
//! }
//!
//! let config = Configuration::new("echo", 2, "echo.local:7", |_cfg| Ok(Echo))
//!     .with_retry_duration(Duration::from_millis(500));
//! let pool = Pool::new(config);
//! pool.init().wait().unwrap();
//!
//! {
//!     let mut conn = pool.get(Duration::from_secs(1), false).unwrap();
//!     // Report a broken connection; the pool replaces it in the background
//!     conn.mark_bad();
//! }
//!
//! pool.close().wait().unwrap();
//! ```

mod completion;
mod config;
mod connection;
mod errors;
mod health;
mod metrics;
mod pool;

pub use completion::Completion;
pub use config::{Configuration, ConnectionFactory};
pub use connection::{Connection, PooledConnection};
pub use errors::{BoxError, PoolError, PoolResult};
pub use health::HealthStatus;
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::PoolMetrics;
pub use pool::Pool;
