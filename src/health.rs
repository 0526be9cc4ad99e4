//! Health monitoring for connection pools

/// Health status of a connection pool
///
/// # Examples
///
/// ```
/// use esox_connectionpool::HealthStatus;
///
/// let health = HealthStatus::new(3, 1, 0, 4, true, false);
/// assert!(health.is_healthy());
/// assert_eq!(health.available_connections, 3);
///
/// let starved = HealthStatus::new(0, 1, 0, 4, true, false);
/// assert!(!starved.is_healthy());
/// ```
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Borrowed share of capacity (0.0 to 1.0)
    pub utilization: f64,

    /// Connections waiting in the pool
    pub available_connections: usize,

    /// Connections lent out
    pub borrowed_connections: usize,

    /// Connections still being established
    pub pending_connections: usize,

    /// Configured pool size
    pub total_capacity: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Create a new health status
    pub fn new(
        available: usize,
        borrowed: usize,
        pending: usize,
        capacity: usize,
        started: bool,
        closed: bool,
    ) -> Self {
        let utilization = if capacity > 0 {
            (borrowed as f64 / capacity as f64).min(1.0)
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if closed {
            warnings.push("Pool is closed".to_string());
            is_healthy = false;
        }

        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if !started && !closed && capacity > 0 {
            warnings.push("Pool has not been initialised".to_string());
        }

        // Slots lost to a connection that could not be re-established
        let accounted = available + borrowed.min(capacity) + pending;
        if started && !closed && accounted < capacity {
            warnings.push(format!(
                "Missing connections: {} of {} accounted for",
                accounted, capacity
            ));
            is_healthy = false;
        }

        if pending > 0 {
            warnings.push(format!("{} connection(s) being established", pending));
        }

        if available == 0 && capacity > 0 {
            warnings.push("Pool is empty".to_string());
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            available_connections: available,
            borrowed_connections: borrowed,
            pending_connections: pending,
            total_capacity: capacity,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_pool_is_unhealthy() {
        let health = HealthStatus::new(0, 0, 0, 4, true, true);
        assert!(!health.is_healthy());
        assert!(health.warnings.iter().any(|w| w == "Pool is closed"));
    }

    #[test]
    fn test_pending_counts_toward_capacity() {
        let health = HealthStatus::new(2, 1, 1, 4, true, false);
        assert!(health.is_healthy());
        assert_eq!(health.warning_count, 1);
    }

    #[test]
    fn test_missing_connections_warn() {
        let health = HealthStatus::new(1, 1, 0, 4, true, false);
        assert!(!health.is_healthy());
        assert!(health.warnings[0].starts_with("Missing connections"));
    }

    #[test]
    fn test_uninitialised_pool_is_not_missing_connections() {
        let health = HealthStatus::new(0, 0, 0, 4, false, false);
        assert!(health.is_healthy());
        assert!(!health.warnings.iter().any(|w| w.starts_with("Missing connections")));
        assert!(health.warnings.iter().any(|w| w == "Pool has not been initialised"));
    }
}
