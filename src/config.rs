//! Pool configuration options

use crate::errors::BoxError;
use std::fmt;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

/// Factory used to establish one connection for the pool
pub type ConnectionFactory<C> =
    Arc<dyn Fn(&Configuration<C>) -> Result<C, BoxError> + Send + Sync>;

/// Configuration for a connection pool
///
/// The configuration is immutable once handed to a [`Pool`](crate::Pool).
///
/// # Examples
///
/// ```
/// use esox_connectionpool::Configuration;
/// use std::time::Duration;
///
/// let config = Configuration::new("cache", 4, "127.0.0.1:6379", |_cfg| Ok(42u32))
///     .with_retry_duration(Duration::from_millis(250));
///
/// assert_eq!(config.size, 4);
/// assert_eq!(config.address, "127.0.0.1:6379");
/// assert_eq!(config.retry_duration, Duration::from_millis(250));
/// ```
pub struct Configuration<C> {
    /// Name of the pool, attached to every log event
    pub name: String,

    /// Number of connections the pool keeps
    pub size: usize,

    /// Address the factory connects to
    pub address: String,

    /// Delay between failed connection attempts
    pub retry_duration: Duration,

    factory: ConnectionFactory<C>,
}

impl<C> Configuration<C> {
    /// Create a configuration with an immediate retry after failures
    pub fn new<F>(
        name: impl Into<String>,
        size: usize,
        address: impl Into<String>,
        factory: F,
    ) -> Self
    where
        F: Fn(&Configuration<C>) -> Result<C, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            size,
            address: address.into(),
            retry_duration: Duration::ZERO,
            factory: Arc::new(factory),
        }
    }

    /// Set the delay between failed connection attempts
    pub fn with_retry_duration(mut self, retry_duration: Duration) -> Self {
        self.retry_duration = retry_duration;
        self
    }

    /// Attempt to establish one connection through the configured factory
    pub fn connect(&self) -> Result<C, BoxError> {
        (self.factory)(self)
    }
}

impl Configuration<TcpStream> {
    /// Configuration whose factory opens a TCP stream to `address`
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_connectionpool::Configuration;
    ///
    /// let config = Configuration::tcp("upstream", 8, "10.0.0.7:7000");
    /// assert_eq!(config.name, "upstream");
    /// ```
    pub fn tcp(name: impl Into<String>, size: usize, address: impl Into<String>) -> Self {
        Self::new(name, size, address, |cfg| {
            let stream = TcpStream::connect(cfg.address.as_str())?;
            stream.set_nodelay(true)?;
            Ok(stream)
        })
    }
}

impl<C> Clone for Configuration<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            size: self.size,
            address: self.address.clone(),
            retry_duration: self.retry_duration,
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<C> fmt::Debug for Configuration<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("address", &self.address)
            .field("retry_duration", &self.retry_duration)
            .finish_non_exhaustive()
    }
}
