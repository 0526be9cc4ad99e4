//! Metrics collection and export for connection pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "metrics")]
use crate::errors::{PoolError, PoolResult};

/// Point-in-time metrics for a pool
///
/// # Examples
///
/// ```
/// use esox_connectionpool::{BoxError, Configuration, Connection, Pool};
/// use std::time::Duration;
///
/// struct Noop;
/// impl Connection for Noop {
///     fn close(&mut self) -> Result<(), BoxError> { Ok(()) }
/// }
///
/// let pool = Pool::new(Configuration::new("m", 2, "noop", |_| Ok(Noop)));
/// pool.init().wait().unwrap();
///
/// let _conn = pool.get(Duration::from_millis(10), false).unwrap();
/// let metrics = pool.get_metrics();
/// assert_eq!(metrics.connections_created, 2);
/// assert_eq!(metrics.total_retrieved, 1);
/// assert_eq!(metrics.borrowed_connections, 1);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Connections the factory established
    pub connections_created: usize,

    /// Connections the pool closed
    pub connections_closed: usize,

    /// Failed factory attempts
    pub connect_failures: usize,

    /// Successful `get` calls
    pub total_retrieved: usize,

    /// Connections handed back to the pool
    pub total_returned: usize,

    /// `get` calls that found no connection within their timeout
    pub timeouts: usize,

    /// Bad connections that were closed and replaced
    pub replacements: usize,

    /// Over-capacity connections created on demand
    pub overflow_created: usize,

    /// Connections currently lent out
    pub borrowed_connections: usize,

    /// Connections currently waiting in the pool
    pub available_connections: usize,

    /// Connections being established in the background
    pub pending_connections: usize,

    /// Borrowed share of capacity (0.0 to 1.0)
    pub utilization: f64,

    /// Configured pool size
    pub capacity: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("connections_created".to_string(), self.connections_created.to_string());
        metrics.insert("connections_closed".to_string(), self.connections_closed.to_string());
        metrics.insert("connect_failures".to_string(), self.connect_failures.to_string());
        metrics.insert("total_retrieved".to_string(), self.total_retrieved.to_string());
        metrics.insert("total_returned".to_string(), self.total_returned.to_string());
        metrics.insert("timeouts".to_string(), self.timeouts.to_string());
        metrics.insert("replacements".to_string(), self.replacements.to_string());
        metrics.insert("overflow_created".to_string(), self.overflow_created.to_string());
        metrics.insert("borrowed_connections".to_string(), self.borrowed_connections.to_string());
        metrics.insert("available_connections".to_string(), self.available_connections.to_string());
        metrics.insert("pending_connections".to_string(), self.pending_connections.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("capacity".to_string(), self.capacity.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Render metrics in the Prometheus text exposition format
    ///
    /// Every series carries a `pool` label plus the optional `tags`.
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        use prometheus::{Encoder, TextEncoder};

        let registry = prometheus::Registry::new();
        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());
        if let Some(tags) = tags {
            labels.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let gauges = [
            ("connpool_connections_borrowed", "Connections currently lent out", metrics.borrowed_connections),
            ("connpool_connections_available", "Connections waiting in the pool", metrics.available_connections),
            ("connpool_connections_pending", "Connections being established", metrics.pending_connections),
            ("connpool_capacity", "Configured pool size", metrics.capacity),
        ];
        for (name, help, value) in gauges {
            let gauge = prometheus::IntGauge::with_opts(Self::opts(name, help, &labels))
                .map_err(Self::error)?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge)).map_err(Self::error)?;
        }

        let utilization = prometheus::Gauge::with_opts(Self::opts(
            "connpool_utilization",
            "Borrowed share of capacity",
            &labels,
        ))
        .map_err(Self::error)?;
        utilization.set(metrics.utilization);
        registry.register(Box::new(utilization)).map_err(Self::error)?;

        let counters = [
            ("connpool_connections_created_total", "Connections established", metrics.connections_created),
            ("connpool_connections_closed_total", "Connections closed", metrics.connections_closed),
            ("connpool_connect_failures_total", "Failed connection attempts", metrics.connect_failures),
            ("connpool_retrieved_total", "Connections handed to callers", metrics.total_retrieved),
            ("connpool_returned_total", "Connections handed back", metrics.total_returned),
            ("connpool_timeouts_total", "Get calls that timed out", metrics.timeouts),
            ("connpool_replacements_total", "Bad connections replaced", metrics.replacements),
            ("connpool_overflow_created_total", "On-demand connections created", metrics.overflow_created),
        ];
        for (name, help, value) in counters {
            let counter = prometheus::IntCounter::with_opts(Self::opts(name, help, &labels))
                .map_err(Self::error)?;
            counter.inc_by(value as u64);
            registry.register(Box::new(counter)).map_err(Self::error)?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .map_err(Self::error)?;
        String::from_utf8(buffer).map_err(|e| PoolError::Metrics(e.to_string()))
    }

    fn opts(name: &str, help: &str, labels: &HashMap<String, String>) -> prometheus::Opts {
        prometheus::Opts::new(name, help).const_labels(labels.clone())
    }

    fn error(err: prometheus::Error) -> PoolError {
        PoolError::Metrics(err.to_string())
    }
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub connections_created: AtomicUsize,
    pub connections_closed: AtomicUsize,
    pub connect_failures: AtomicUsize,
    pub total_retrieved: AtomicUsize,
    pub total_returned: AtomicUsize,
    pub timeouts: AtomicUsize,
    pub replacements: AtomicUsize,
    pub overflow_created: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(
        &self,
        borrowed: usize,
        available: usize,
        pending: usize,
        capacity: usize,
    ) -> PoolMetrics {
        let utilization = if capacity > 0 {
            (borrowed as f64 / capacity as f64).min(1.0)
        } else {
            0.0
        };

        PoolMetrics {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            total_retrieved: self.total_retrieved.load(Ordering::Relaxed),
            total_returned: self.total_returned.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            replacements: self.replacements.load(Ordering::Relaxed),
            overflow_created: self.overflow_created.load(Ordering::Relaxed),
            borrowed_connections: borrowed,
            available_connections: available,
            pending_connections: pending,
            utilization,
            capacity,
        }
    }
}
